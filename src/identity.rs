// Authenticated radix-trie key/value store.
//
// SPDX-License-Identifier: Apache-2.0

//! Deterministic root initialization (spec component J).
//!
//! `must_init_root` creates the trie's very first node — an empty-path-
//! fragment root carrying only the identity terminal — and commits it, so
//! that `get("")` on any later root derived from it always returns the
//! identity bytes (spec.md §3 invariant I4, §8 property P8).

use crate::commitment::{CommitmentModel, VCommitment};
use crate::error::TrieError;
use crate::kv::{partitioned_key, KVWriter, PARTITION_TRIE_NODES, PARTITION_VALUES};
use crate::node::NodeData;

/// Creates and commits the initial root for a fresh trie, binding `identity`
/// at the empty key. `identity` must be non-empty (spec.md `ErrEmptyIdentity`).
///
/// Different identities always yield different initial roots, since the root
/// commitment is a function of its terminal.
pub fn must_init_root<W: KVWriter, M: CommitmentModel>(
    store: &mut W,
    model: &M,
    identity: &[u8],
) -> Result<VCommitment, TrieError> {
    if identity.is_empty() {
        return Err(TrieError::EmptyIdentity);
    }

    let mut root = NodeData::new(Vec::new());
    root.terminal = Some(model.commit_to_data(identity));
    model.update_node_commitment(&mut root, false);
    let commitment = root.commitment.clone().expect("update_node_commitment always sets commitment");

    let take_terminal_from_value = root.take_terminal_from_value(model);
    let encoded = root.encode(model.path_arity(), model.hash_size(), take_terminal_from_value);
    store.set(&partitioned_key(PARTITION_TRIE_NODES, commitment.as_bytes()), &encoded);

    // An identity longer than the hash size is hashed rather than inlined
    // (spec.md §4.C `commitToData`); its plaintext still needs to live in the
    // values partition, keyed by the empty key, so `get("")` can recover it.
    let identity_is_inlined = root.terminal.as_ref().is_some_and(|t| t.value_in_commitment);
    if !identity_is_inlined {
        store.set(&partitioned_key(PARTITION_VALUES, &[]), identity);
    }

    Ok(commitment)
}
