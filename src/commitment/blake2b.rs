// Authenticated radix-trie key/value store.
//
// SPDX-License-Identifier: Apache-2.0

//! Concrete Blake2b commitment model (spec component C).
//!
//! Builds the fixed `arity + 3`-slot hash vector described in spec.md 4.C
//! and hashes it with [`crate::digest::TrieHasher`]. The vector-building
//! logic lives here (not in `proof::merkle`) and is re-exported so the
//! standalone Merkle proof verifier can recompute the exact same hash from
//! a proof element without depending on any trie type — only on this
//! module's plain data, matching the independence spec.md §4.I demands of
//! the verifier.

use std::collections::BTreeMap;

use crate::commitment::{CommitmentModel, HashSize, TCommitment, VCommitment};
use crate::digest::{hash_bytes, TrieHasher};
use crate::node::NodeData;
use crate::path::{Digit, PathArity};

const HASH_TAG: &[u8] = b"trie256:blake2b:node-vector:v1";

/// Concrete Blake2b-based commitment model, configured by arity, hash size,
/// and the value-size threshold above which a terminal is considered
/// "costly" and therefore always kept inline with its node.
#[derive(Clone, Debug)]
pub struct Blake2bModel {
    arity: PathArity,
    hash_size: HashSize,
    costly_threshold: usize,
}

impl Blake2bModel {
    pub fn new(arity: PathArity, hash_size: HashSize, costly_threshold: usize) -> Self {
        Blake2bModel { arity, hash_size, costly_threshold }
    }

    /// Index of the terminal slot in the node's hash vector (spec.md 4.C).
    pub fn terminal_commitment_index(&self) -> usize { self.arity.arity() + 1 }

    /// Index of the path-fragment slot in the node's hash vector.
    pub fn path_fragment_commitment_index(&self) -> usize { self.arity.arity() + 2 }

    /// Total number of slots in the node's hash vector.
    pub fn vector_len(&self) -> usize { self.arity.arity() + 3 }

    /// Hash-compresses a path fragment down to a single vector slot's
    /// content, used both when assembling a node's own vector and when the
    /// Merkle verifier recomputes a parent's vector from a proof element.
    pub fn compress_path_fragment(&self, path_fragment: &[Digit]) -> Vec<u8> {
        let mut buf = Vec::new();
        crate::path::encode_digits_on_wire(path_fragment, self.arity, &mut buf);
        hash_bytes(&buf, self.hash_size)
    }

    /// Assembles the `arity + 3`-slot vector (each slot `hash_size + 1`
    /// bytes: one discriminant byte marking "present" vs. the all-zero
    /// placeholder, then `hash_size` zero-padded content bytes) and hashes
    /// it. This is the single point of truth both `calc_node_commitment`
    /// and the standalone Merkle verifier call into.
    pub fn hash_vector(
        &self,
        children: &BTreeMap<Digit, Vec<u8>>,
        terminal: Option<&[u8]>,
        path_fragment_compressed: &[u8],
    ) -> VCommitment {
        let mut engine = TrieHasher::from_tag(HASH_TAG, self.hash_size);
        let slots = self.vector_len();
        for idx in 0..slots {
            let content: Option<&[u8]> = if idx < self.arity.arity() {
                children.get(&(idx as Digit)).map(|v| v.as_slice())
            } else if idx == self.terminal_commitment_index() {
                terminal
            } else if idx == self.path_fragment_commitment_index() {
                Some(path_fragment_compressed)
            } else {
                None
            };
            write_slot(&mut engine, content, self.hash_size);
        }
        VCommitment(engine.finish())
    }
}

fn write_slot(engine: &mut TrieHasher, content: Option<&[u8]>, hash_size: HashSize) {
    match content {
        Some(bytes) => {
            engine.input_raw(&[1u8]);
            let mut padded = vec![0u8; hash_size.as_usize()];
            let n = bytes.len().min(padded.len());
            padded[..n].copy_from_slice(&bytes[..n]);
            engine.input_raw(&padded);
        }
        None => {
            engine.input_raw(&[0u8]);
            engine.input_raw(&vec![0u8; hash_size.as_usize()]);
        }
    }
}

impl CommitmentModel for Blake2bModel {
    fn path_arity(&self) -> PathArity { self.arity }

    fn hash_size(&self) -> HashSize { self.hash_size }

    fn commit_to_data(&self, value: &[u8]) -> TCommitment {
        let costly = value.len() > self.costly_threshold;
        if value.len() <= self.hash_size.as_usize() {
            TCommitment { raw: value.to_vec(), value_in_commitment: true, costly }
        } else {
            TCommitment { raw: hash_bytes(value, self.hash_size), value_in_commitment: false, costly }
        }
    }

    fn calc_node_commitment(&self, node: &NodeData) -> VCommitment {
        let children: BTreeMap<Digit, Vec<u8>> =
            node.children.iter().map(|(d, c)| (*d, c.0.clone())).collect();
        let terminal = node.terminal.as_ref().map(|t| t.raw.as_slice());
        let compressed = self.compress_path_fragment(&node.path_fragment);
        self.hash_vector(&children, terminal, &compressed)
    }

    fn always_store_terminal_with_node(&self) -> bool { false }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::commitment::test_helpers::model_pairs;

    #[test]
    fn commit_to_data_inlines_small_values() {
        let model = Blake2bModel::new(PathArity::Byte, HashSize::Bits160, 32);
        let t = model.commit_to_data(b"18-byte-value-123!");
        assert!(t.value_in_commitment);
        assert_eq!(t.raw, b"18-byte-value-123!");
        assert!(!t.costly);
    }

    #[test]
    fn commit_to_data_hashes_large_values() {
        let model = Blake2bModel::new(PathArity::Byte, HashSize::Bits160, 16);
        let value = vec![7u8; 21];
        let t = model.commit_to_data(&value);
        assert!(!t.value_in_commitment);
        assert_eq!(t.raw.len(), 20);
        assert!(t.costly);
    }

    #[test]
    fn node_commitment_is_deterministic_across_models() {
        for model in model_pairs() {
            let node = NodeData::new(vec![]);
            let a = model.calc_node_commitment(&node);
            let b = model.calc_node_commitment(&node);
            assert_eq!(a, b);
            assert_eq!(a.0.len(), model.hash_size().as_usize());
        }
    }

    #[test]
    fn distinct_nodes_commit_differently() {
        let model = Blake2bModel::new(PathArity::Nibble, HashSize::Bits256, 32);
        let a = NodeData::new(vec![1, 2]);
        let b = NodeData::new(vec![1, 3]);
        assert_ne!(model.calc_node_commitment(&a), model.calc_node_commitment(&b));
    }

    #[test]
    fn force_store_terminal_with_node_marks_costly_without_changing_bytes() {
        let model = Blake2bModel::new(PathArity::Byte, HashSize::Bits160, 32);
        let small = model.commit_to_data(b"short");
        assert!(!small.costly);
        let forced = model.force_store_terminal_with_node(&small);
        assert!(forced.costly);
        assert_eq!(forced.raw, small.raw);
        assert_eq!(forced.value_in_commitment, small.value_in_commitment);
    }
}
