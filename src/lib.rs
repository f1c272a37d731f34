// Authenticated radix-trie key/value store.
//
// SPDX-License-Identifier: Apache-2.0

#![deny(unsafe_code, non_upper_case_globals, non_camel_case_types, non_snake_case)]
#![warn(dead_code, missing_docs, unused_variables, unused_mut, unused_imports)]

//! A cryptographically authenticated key/value store built on a variable-
//! arity radix trie (2-, 16-, or 256-ary) whose every node carries a vector
//! commitment binding its children and a terminal commitment binding the
//! value stored at that node's key.
//!
//! The root commitment is a succinct digest of the whole mapping; for any
//! key the crate can produce a compact Merkle proof of inclusion or absence
//! that a third party can verify from the root alone, using only the
//! [`commitment`] module — no trie traversal required.
//!
//! ```
//! use trie256::commitment::{Blake2bModel, HashSize};
//! use trie256::kv::MemoryStore;
//! use trie256::path::PathArity;
//! use trie256::{identity, TrieReader, TrieUpdatable};
//!
//! let model = Blake2bModel::new(PathArity::Byte, HashSize::Bits160, 32);
//! let mut store = MemoryStore::new();
//! let root0 = identity::must_init_root(&mut store, &model, b"my-trie-identity").unwrap();
//!
//! let mut trie = TrieUpdatable::new(&mut store, model.clone(), root0).unwrap();
//! trie.update(b"hello", b"world").unwrap();
//! let root1 = trie.commit().unwrap();
//!
//! let reader = TrieReader::new(&store, model, root1);
//! assert_eq!(reader.get(b"hello").unwrap(), Some(b"world".to_vec()));
//! ```

#[macro_use]
extern crate amplify;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde;

pub mod commitment;
pub mod config;
pub mod digest;
pub mod error;
pub mod identity;
pub mod kv;
pub mod node;
pub mod path;
pub mod proof;
pub mod reader;
pub mod store;
pub mod stream;
mod traverse;
pub mod updatable;

pub use error::{ProofError, TrieError};
pub use reader::TrieReader;
pub use traverse::Ending;
pub use updatable::TrieUpdatable;
