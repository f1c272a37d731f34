// Authenticated radix-trie key/value store.
//
// SPDX-License-Identifier: Apache-2.0

//! Generic proof builder (spec component H): walks a key from the root down
//! to its terminal/split/extend site and records the `(NodeData, digit)`
//! pair visited at every step, model-agnostic — it depends only on
//! [`CommitmentModel::path_arity`], never on a specific hash family. The
//! concrete, Blake2b-specific proof format and standalone verifier built
//! from this output live in [`merkle`].

pub mod merkle;

use crate::commitment::{CommitmentModel, VCommitment};
use crate::error::TrieError;
use crate::kv::KVReader;
use crate::node::NodeData;
use crate::path::{self, Digit, PathArity};
use crate::store::NodeStore;
use crate::traverse::{self, Ending};

/// Index of the terminal slot in a node's `arity + 3` hash vector. Plain
/// arithmetic on the arity, not tied to any particular hash family (spec.md
/// 4.C defines it for Blake2b, but the slot layout itself is a property of
/// the node shape, shared by any vector-commitment model over this arity).
pub const fn terminal_commitment_index(arity: PathArity) -> Digit { arity.arity() as Digit + 1 }

/// Index of the path-fragment slot in a node's hash vector.
pub const fn path_fragment_commitment_index(arity: PathArity) -> Digit { arity.arity() as Digit + 2 }

/// One step of a generic proof path: the node visited, and the digit of the
/// child the walk either descended into (interior steps) or attempted to
/// descend into and found absent (a final `Ending::Extend` step).
pub struct ProofStep {
    /// The trie node visited at this depth.
    pub node: NodeData,
    /// For an interior step, the digit actually descended into. For a final
    /// `Ending::Extend` step, the (absent) digit the key would have needed.
    /// Meaningless (`0`) for final `Terminal`/`Split` steps — those are
    /// re-mapped to a fixed slot index by the concrete proof format instead.
    pub child_digit: Digit,
}

/// A model-agnostic proof path plus the ending code classifying its last
/// step (spec.md §4.F/§4.H).
pub struct GenericProof {
    /// The nodes visited, root first.
    pub steps: Vec<ProofStep>,
    /// How the last step resolved.
    pub ending: Ending,
}

/// Walks from `root` down to the terminal/split/extend site for `key`,
/// recording every node visited (spec component H).
pub fn build<R: KVReader, M: CommitmentModel>(
    store: &NodeStore<R>,
    model: &M,
    root: &VCommitment,
    key: &[u8],
) -> Result<GenericProof, TrieError> {
    let digits = path::unpack(key, model.path_arity());
    let mut remaining: &[Digit] = digits.as_slice();
    let mut path_prefix: Vec<Digit> = Vec::new();
    let mut commitment = root.clone();
    let mut steps = Vec::new();

    loop {
        let node = store
            .fetch_node_data_with_key(commitment.as_bytes(), &path_prefix)?
            .ok_or_else(|| TrieError::CorruptStore(format!("missing node for commitment {commitment:?}")))?;

        let s = traverse::step(&node.path_fragment, remaining);
        match s.ending {
            Ending::Terminal => {
                steps.push(ProofStep { node, child_digit: 0 });
                return Ok(GenericProof { steps, ending: Ending::Terminal });
            }
            Ending::Split => {
                steps.push(ProofStep { node, child_digit: 0 });
                return Ok(GenericProof { steps, ending: Ending::Split });
            }
            Ending::None => {
                let digit = s.next_digit.expect("None ending always carries next_digit");
                match node.children.get(&digit).cloned() {
                    None => {
                        steps.push(ProofStep { node, child_digit: digit });
                        return Ok(GenericProof { steps, ending: Ending::Extend });
                    }
                    Some(child) => {
                        path_prefix.extend_from_slice(&node.path_fragment);
                        path_prefix.push(digit);
                        remaining = &remaining[s.fragment_consumed + 1..];
                        steps.push(ProofStep { node, child_digit: digit });
                        commitment = child;
                    }
                }
            }
            Ending::Extend => unreachable!("traverse::step never returns Extend directly"),
        }
    }
}
