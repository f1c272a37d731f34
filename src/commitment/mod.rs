// Authenticated radix-trie key/value store.
//
// SPDX-License-Identifier: Apache-2.0

//! Commitment model abstraction (spec component B) and its concrete
//! Blake2b-based implementation (spec component C).
//!
//! Grounded on `commit_verify`'s `CommitVerify`/`TryCommitVerify` traits
//! (`commit_verify/src/commit.rs`): a small, closed capability interface
//! rather than an open-ended inheritance hierarchy, matching spec.md §9's
//! instruction to treat the commitment model as "a closed set of variants".

mod blake2b;

pub use blake2b::Blake2bModel;

use crate::node::NodeData;
use crate::path::PathArity;

/// Hash output width supported by the concrete Blake2b model.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HashSize {
    /// 160-bit (20-byte) digests.
    Bits160,
    /// 256-bit (32-byte) digests.
    Bits256,
}

impl HashSize {
    pub const fn as_usize(self) -> usize {
        match self {
            HashSize::Bits160 => 20,
            HashSize::Bits256 => 32,
        }
    }

    pub const fn wire_tag(self) -> u8 {
        match self {
            HashSize::Bits160 => 160,
            HashSize::Bits256 => 0, // 256 does not fit a u8; 0 is reserved for it on the wire.
        }
    }

    pub fn from_wire_tag(tag: u8) -> Option<Self> {
        match tag {
            160 => Some(HashSize::Bits160),
            0 => Some(HashSize::Bits256),
            _ => None,
        }
    }
}

/// Vector commitment: binds a node's children, terminal, and path fragment.
/// Size equals the model's configured hash size (spec.md §3).
#[derive(Clone, Eq, PartialEq, Hash, Default)]
pub struct VCommitment(pub Vec<u8>);

impl VCommitment {
    pub fn as_bytes(&self) -> &[u8] { &self.0 }

    pub fn is_empty_slot(&self, hash_size: HashSize) -> bool {
        self.0.is_empty() || self.0 == vec![0u8; hash_size.as_usize()]
    }
}

impl std::fmt::Debug for VCommitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VCommitment(")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

/// Terminal commitment: binds the value stored at a node's key (spec.md §3).
///
/// `value_in_commitment` is true when `raw` *is* the value (it fit within
/// hash size); `costly` is true when the originating value exceeded the
/// model's inlining threshold and must therefore always be stored with the
/// node rather than externalized (spec.md 4.C).
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct TCommitment {
    pub raw: Vec<u8>,
    pub value_in_commitment: bool,
    pub costly: bool,
}

impl TCommitment {
    pub fn as_bytes(&self) -> &[u8] { &self.raw }
}

/// Polymorphic commitment-model contract (spec component B).
///
/// A second, algebraic (KZG-style) implementation could plug in at this
/// trait boundary; its cryptography is out of scope here (spec.md §1, §9).
pub trait CommitmentModel: Clone {
    fn path_arity(&self) -> PathArity;
    fn hash_size(&self) -> HashSize;

    /// Always-empty vector commitment, ready to be filled or deserialized.
    fn new_vector_commitment(&self) -> VCommitment { VCommitment(Vec::new()) }

    /// Always-empty terminal commitment, ready to be filled or deserialized.
    fn new_terminal_commitment(&self) -> TCommitment { TCommitment::default() }

    /// Commits to a value; `None` denotes "no terminal" and must not be
    /// passed here (callers clear `NodeData::terminal` directly instead).
    fn commit_to_data(&self, value: &[u8]) -> TCommitment;

    /// Canonical, from-scratch commitment computation for a node.
    fn calc_node_commitment(&self, node: &NodeData) -> VCommitment;

    /// In-place update of a node's commitment given the new child
    /// commitments, terminal, and path fragment. `can_use_delta = false`
    /// means the implementation may not assume `node.commitment` (if any)
    /// is still valid; the Blake2b model always recomputes from scratch
    /// regardless, since it has no algebraic delta structure to exploit.
    fn update_node_commitment(&self, node: &mut NodeData, can_use_delta: bool) {
        let _ = can_use_delta;
        node.commitment = Some(self.calc_node_commitment(node));
    }

    fn equal(&self, a: &VCommitment, b: &VCommitment) -> bool { a == b }

    /// Whether this model always keeps terminals inlined with the node
    /// record rather than ever externalizing them to the values partition.
    fn always_store_terminal_with_node(&self) -> bool { false }

    /// Returns a copy of `terminal` with its storage policy forced so it
    /// will always be kept with its node rather than ever being considered
    /// for externalization — regardless of what [`CommitmentModel::
    /// commit_to_data`] would otherwise have decided from its size alone
    /// (spec.md §4.B `forceStoreTerminalWithNode`). This is the per-terminal
    /// counterpart to the model-wide [`CommitmentModel::
    /// always_store_terminal_with_node`] toggle.
    fn force_store_terminal_with_node(&self, terminal: &TCommitment) -> TCommitment {
        TCommitment { costly: true, ..terminal.clone() }
    }
}
