// Authenticated radix-trie key/value store.
//
// SPDX-License-Identifier: Apache-2.0

//! Update-side trie (spec component G): a buffered node overlay supporting
//! `update`/`delete`/`delete_prefix`, committed bottom-up into a new root.
//!
//! The overlay is a tree of [`BufferedNode`]s rooted at `TrieUpdatable::root`.
//! Untouched subtrees stay as bare [`VCommitment`]s (`Child::Committed`);
//! touching a child for the first time this commit materializes it by
//! fetching and decoding its record (`Child::Buffered`). This mirrors the
//! spec's "fetched vs. modified" node distinction (spec.md §9) as a plain
//! Rust enum rather than a pair of parallel maps with back-pointers: parent-
//! to-child traversal is recursive, never the reverse.

use std::collections::BTreeMap;

use crate::commitment::{CommitmentModel, HashSize, VCommitment};
use crate::error::TrieError;
use crate::kv::{partitioned_key, KVReader, KVWriter, PARTITION_TRIE_NODES, PARTITION_VALUES};
use crate::node::NodeData;
use crate::path::{self, Digit, DigitSeq, PathArity};
use crate::store::NodeStore;
use crate::traverse::{self, Ending};

/// A child slot in the overlay: either untouched this commit (only its
/// committed commitment known) or materialized into a buffered node.
enum Child {
    Committed(VCommitment),
    Buffered(Box<BufferedNode>),
}

/// One node of the mutable overlay.
///
/// `pending_value` holds the plaintext behind `terminal` only when that
/// terminal was *freshly set this round* by [`BufferedNode::update`] — it is
/// `None` for terminals carried over unchanged from a fetched record, since
/// their externalized value (if any) is already correctly persisted under
/// the node's full key and needs no rewriting. `commitment` is cleared
/// (`None`) by any mutation to this node's own fields or to any descendant
/// (spec.md §3 invariant: "cleared by any mutation").
struct BufferedNode {
    path_fragment: Vec<Digit>,
    terminal: Option<crate::commitment::TCommitment>,
    pending_value: Option<Vec<u8>>,
    children: BTreeMap<Digit, Child>,
    commitment: Option<VCommitment>,
    /// Digits from the root down to (not including) this node's own
    /// `path_fragment`. Combined with `path_fragment` it yields this node's
    /// full trie key, needed to address externalized values and to resolve
    /// `takeTerminalFromValue` nodes on first fetch.
    trie_path: Vec<Digit>,
}

impl BufferedNode {
    fn from_node_data(data: NodeData, trie_path: Vec<Digit>) -> Self {
        BufferedNode {
            path_fragment: data.path_fragment,
            terminal: data.terminal,
            pending_value: None,
            children: data.children.into_iter().map(|(d, c)| (d, Child::Committed(c))).collect(),
            commitment: data.commitment,
            trie_path,
        }
    }

    /// Ensures the child at `digit` is buffered, fetching and decoding it
    /// from the store on first touch.
    fn materialize_child<R: KVReader>(&mut self, digit: Digit, store: &NodeStore<R>) -> Result<(), TrieError> {
        let commitment = match self.children.get(&digit) {
            Some(Child::Committed(vc)) => vc.clone(),
            Some(Child::Buffered(_)) => return Ok(()),
            None => return Ok(()),
        };
        let mut prefix = self.trie_path.clone();
        prefix.extend_from_slice(&self.path_fragment);
        prefix.push(digit);
        let data = store
            .fetch_node_data_with_key(commitment.as_bytes(), &prefix)?
            .ok_or_else(|| TrieError::CorruptStore(format!("missing node for commitment {commitment:?}")))?;
        self.children.insert(digit, Child::Buffered(Box::new(BufferedNode::from_node_data(data, prefix))));
        Ok(())
    }

    /// Mutable access to an already-[`materialize_child`]ed child.
    fn child_mut(&mut self, digit: Digit) -> &mut BufferedNode {
        match self.children.get_mut(&digit) {
            Some(Child::Buffered(b)) => b.as_mut(),
            _ => unreachable!("materialize_child must be called before child_mut"),
        }
    }

    /// Inserts `value` at the key whose remaining unconsumed digits (below
    /// this node) are `remaining` (spec.md §4.G "Update").
    fn update<R: KVReader, M: CommitmentModel>(
        &mut self,
        store: &NodeStore<R>,
        model: &M,
        remaining: &[Digit],
        value: &[u8],
    ) -> Result<(), TrieError> {
        let step = traverse::step(&self.path_fragment, remaining);
        match step.ending {
            Ending::Terminal => {
                self.terminal = Some(model.commit_to_data(value));
                self.pending_value = Some(value.to_vec());
                self.commitment = None;
                Ok(())
            }

            Ending::Split => {
                let (prefix, pf_tail, key_tail) =
                    DigitSeq(self.path_fragment.clone()).common_prefix(remaining);
                debug_assert!(!pf_tail.is_empty(), "Split requires the fragment to diverge mid-way");
                let digit_for_old = pf_tail[0];

                let mut old_trie_path = self.trie_path.clone();
                old_trie_path.extend_from_slice(&prefix);
                old_trie_path.push(digit_for_old);
                let old_child = BufferedNode {
                    path_fragment: pf_tail[1..].to_vec(),
                    terminal: self.terminal.take(),
                    pending_value: self.pending_value.take(),
                    children: std::mem::take(&mut self.children),
                    commitment: None,
                    trie_path: old_trie_path,
                };

                self.path_fragment = prefix.clone();
                self.commitment = None;
                self.children = BTreeMap::new();
                self.children.insert(digit_for_old, Child::Buffered(Box::new(old_child)));

                if key_tail.is_empty() {
                    self.terminal = Some(model.commit_to_data(value));
                    self.pending_value = Some(value.to_vec());
                } else {
                    let digit_for_new = key_tail[0];
                    let mut new_trie_path = self.trie_path.clone();
                    new_trie_path.extend_from_slice(&prefix);
                    new_trie_path.push(digit_for_new);
                    let new_child = BufferedNode {
                        path_fragment: key_tail[1..].to_vec(),
                        terminal: Some(model.commit_to_data(value)),
                        pending_value: Some(value.to_vec()),
                        children: BTreeMap::new(),
                        commitment: None,
                        trie_path: new_trie_path,
                    };
                    self.children.insert(digit_for_new, Child::Buffered(Box::new(new_child)));
                }
                Ok(())
            }

            Ending::None => {
                let digit = step.next_digit.expect("None ending always carries next_digit");
                let rest = &remaining[step.fragment_consumed + 1..];
                if self.children.contains_key(&digit) {
                    self.materialize_child(digit, store)?;
                    self.child_mut(digit).update(store, model, rest, value)?;
                } else {
                    // Ending::Extend: no child at this digit yet.
                    let mut child_trie_path = self.trie_path.clone();
                    child_trie_path.extend_from_slice(&self.path_fragment);
                    child_trie_path.push(digit);
                    let new_child = BufferedNode {
                        path_fragment: rest.to_vec(),
                        terminal: Some(model.commit_to_data(value)),
                        pending_value: Some(value.to_vec()),
                        children: BTreeMap::new(),
                        commitment: None,
                        trie_path: child_trie_path,
                    };
                    self.children.insert(digit, Child::Buffered(Box::new(new_child)));
                }
                self.commitment = None;
                Ok(())
            }

            Ending::Extend => unreachable!("traverse::step never returns Extend directly"),
        }
    }

    /// Clears the terminal at the key whose remaining digits are `remaining`,
    /// if present, and returns whether anything was deleted. Idempotent on
    /// absent keys (spec.md §4.G "Delete").
    fn delete<R: KVReader>(&mut self, store: &NodeStore<R>, remaining: &[Digit]) -> Result<bool, TrieError> {
        let step = traverse::step(&self.path_fragment, remaining);
        match step.ending {
            Ending::Terminal => {
                if self.terminal.is_none() {
                    return Ok(false);
                }
                self.terminal = None;
                self.pending_value = None;
                self.commitment = None;
                Ok(true)
            }
            Ending::Split => Ok(false),
            Ending::None => {
                let digit = step.next_digit.expect("None ending always carries next_digit");
                if !self.children.contains_key(&digit) {
                    return Ok(false); // Ending::Extend: key absent.
                }
                self.materialize_child(digit, store)?;
                let rest = &remaining[step.fragment_consumed + 1..];
                let found = self.child_mut(digit).delete(store, rest)?;
                if found {
                    self.commitment = None;
                    self.apply_merge(digit, store)?;
                }
                Ok(found)
            }
            Ending::Extend => unreachable!("traverse::step never returns Extend directly"),
        }
    }

    /// Clears the terminal and all children of the deepest node whose key-
    /// plus-fragment has `remaining` as a prefix, in one pass, then merge-
    /// propagates toward the root (spec.md §4.G "Delete-prefix"). Constant
    /// work at the top of the affected subtree: descendants are dropped
    /// without being visited.
    fn delete_prefix<R: KVReader>(
        &mut self,
        store: &NodeStore<R>,
        remaining: &[Digit],
    ) -> Result<bool, TrieError> {
        let shared =
            self.path_fragment.iter().zip(remaining.iter()).take_while(|(a, b)| a == b).count();

        if shared == remaining.len() {
            if self.terminal.is_none() && self.children.is_empty() {
                return Ok(false);
            }
            self.terminal = None;
            self.pending_value = None;
            self.children = BTreeMap::new();
            self.commitment = None;
            return Ok(true);
        }

        if shared < self.path_fragment.len() {
            return Ok(false); // Fragment diverges from the prefix: nothing matches.
        }

        let digit = remaining[shared];
        if !self.children.contains_key(&digit) {
            return Ok(false);
        }
        self.materialize_child(digit, store)?;
        let rest = &remaining[shared + 1..];
        let found = self.child_mut(digit).delete_prefix(store, rest)?;
        if found {
            self.commitment = None;
            self.apply_merge(digit, store)?;
        }
        Ok(found)
    }

    /// Applies the merge rule (spec.md §4.G) to the already-materialized
    /// child at `digit`: keep it if it still carries a terminal or ≥ 2
    /// children, drop it if it has neither, or splice its sole child up into
    /// this slot otherwise. Never called on the root itself — only on a
    /// root's *children*, which remain subject to the ordinary rule.
    fn apply_merge<R: KVReader>(&mut self, digit: Digit, store: &NodeStore<R>) -> Result<(), TrieError> {
        let (has_terminal, child_count) = match self.children.get(&digit) {
            Some(Child::Buffered(b)) => (b.terminal.is_some(), b.children.len()),
            _ => unreachable!("child at this digit was just materialized"),
        };

        if has_terminal || child_count >= 2 {
            return Ok(()); // spec.md I1: still a valid node, keep as-is.
        }

        if child_count == 0 {
            self.children.remove(&digit);
            return Ok(());
        }

        // Exactly one grandchild: splice it up into this slot.
        let child = match self.children.remove(&digit) {
            Some(Child::Buffered(b)) => *b,
            _ => unreachable!(),
        };
        let (&gdigit, _) = child.children.iter().next().expect("child_count == 1 checked above");
        let mut grandchildren = child.children;
        let grandchild_slot = grandchildren.remove(&gdigit).expect("just observed key");

        let grandchild = match grandchild_slot {
            Child::Buffered(b) => *b,
            Child::Committed(vc) => {
                let mut prefix = child.trie_path.clone();
                prefix.extend_from_slice(&child.path_fragment);
                prefix.push(gdigit);
                let data = store.fetch_node_data_with_key(vc.as_bytes(), &prefix)?.ok_or_else(|| {
                    TrieError::CorruptStore(format!("missing node for commitment {vc:?}"))
                })?;
                BufferedNode::from_node_data(data, prefix)
            }
        };

        let mut spliced_fragment = child.path_fragment.clone();
        spliced_fragment.push(gdigit);
        spliced_fragment.extend_from_slice(&grandchild.path_fragment);

        let spliced = BufferedNode {
            path_fragment: spliced_fragment,
            terminal: grandchild.terminal,
            pending_value: grandchild.pending_value,
            children: grandchild.children,
            commitment: None,
            trie_path: child.trie_path,
        };
        self.children.insert(digit, Child::Buffered(Box::new(spliced)));
        Ok(())
    }

    /// Recomputes commitments bottom-up for every dirty descendant plus this
    /// node, writing each mutated node's record (and any freshly-pending
    /// externalized value) to `writer` (spec.md §4.G "Commit").
    fn commit<W: KVWriter, M: CommitmentModel>(
        &mut self,
        model: &M,
        writer: &mut W,
        arity: PathArity,
        hash_size: HashSize,
    ) -> Result<VCommitment, TrieError> {
        if let Some(commitment) = &self.commitment {
            return Ok(commitment.clone());
        }

        let mut children_map = BTreeMap::new();
        for (&digit, slot) in self.children.iter_mut() {
            let vc = match slot {
                Child::Committed(vc) => vc.clone(),
                Child::Buffered(b) => b.commit(model, writer, arity, hash_size)?,
            };
            children_map.insert(digit, vc);
        }

        let mut node_data = NodeData {
            path_fragment: self.path_fragment.clone(),
            children: children_map,
            terminal: self.terminal.clone(),
            commitment: None,
        };
        model.update_node_commitment(&mut node_data, false);
        let commitment =
            node_data.commitment.clone().expect("update_node_commitment always sets commitment");

        let take_terminal_from_value = node_data.take_terminal_from_value(model);
        let encoded = node_data.encode(arity, hash_size, take_terminal_from_value);
        writer.set(&partitioned_key(PARTITION_TRIE_NODES, commitment.as_bytes()), &encoded);

        // Plaintext is externalized to the values partition whenever the
        // terminal isn't inlined, *regardless* of `costly`: `costly` only
        // controls whether the node record itself re-derives the terminal
        // from that externalized value (`take_terminal_from_value`) or keeps
        // a copy of the hash inline — `get` must recover the plaintext
        // either way.
        let should_externalize = node_data.terminal.as_ref().is_some_and(|t| !t.value_in_commitment);
        if should_externalize {
            if let Some(value) = &self.pending_value {
                let mut full_digits = self.trie_path.clone();
                full_digits.extend_from_slice(&self.path_fragment);
                let key_bytes = path::pack(&full_digits, arity)
                    .map_err(|e| TrieError::Internal(format!("full key not packable: {e}")))?;
                writer.set(&partitioned_key(PARTITION_VALUES, &key_bytes), value);
            }
        }

        self.commitment = Some(commitment.clone());
        self.pending_value = None;
        Ok(commitment)
    }
}

/// Update-side trie view (spec component G): exclusively owns a buffered
/// overlay over one backing store until [`TrieUpdatable::commit`] consumes
/// it (spec.md §3 "Ownership").
pub struct TrieUpdatable<'s, S: KVReader + KVWriter, M: CommitmentModel> {
    store: &'s mut S,
    model: M,
    root: BufferedNode,
}

impl<'s, S: KVReader + KVWriter, M: CommitmentModel> TrieUpdatable<'s, S, M> {
    /// Opens an updatable view anchored at `root`. Fails with
    /// [`TrieError::RootNotFound`] if the store has no node for it.
    pub fn new(store: &'s mut S, model: M, root: VCommitment) -> Result<Self, TrieError> {
        let node_store = NodeStore::new(&*store, model.path_arity(), model.hash_size());
        let data = node_store
            .fetch_node_data(root.as_bytes())?
            .ok_or_else(|| TrieError::RootNotFound(root.as_bytes().to_vec()))?;
        let root_node = BufferedNode::from_node_data(data, Vec::new());
        Ok(TrieUpdatable { store, model, root: root_node })
    }

    pub fn model(&self) -> &M { &self.model }

    /// Inserts or overwrites `key`. An empty `value` is treated as
    /// [`TrieUpdatable::delete`], matching the "value empty ⇒ delete"
    /// convention the backing [`KVWriter`] contract uses (spec.md §6).
    pub fn update(&mut self, key: &[u8], value: &[u8]) -> Result<(), TrieError> {
        if value.is_empty() {
            return self.delete(key);
        }
        let digits = path::unpack(key, self.model.path_arity());
        let node_store = NodeStore::new(&*self.store, self.model.path_arity(), self.model.hash_size());
        self.root.update(&node_store, &self.model, digits.as_slice(), value)
    }

    /// Removes `key`. Idempotent: a no-op if the key is absent.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), TrieError> {
        let digits = path::unpack(key, self.model.path_arity());
        let node_store = NodeStore::new(&*self.store, self.model.path_arity(), self.model.hash_size());
        self.root.delete(&node_store, digits.as_slice())?;
        Ok(())
    }

    /// Removes every key with `prefix`. A no-op when `prefix` is empty
    /// (spec.md §9 open question #2: the root and its identity terminal are
    /// never touched by a prefix delete; use [`TrieUpdatable::clear`] for an
    /// explicit full wipe).
    pub fn delete_prefix(&mut self, prefix: &[u8]) -> Result<(), TrieError> {
        let digits = path::unpack(prefix, self.model.path_arity());
        if digits.is_empty() {
            return Ok(());
        }
        let node_store = NodeStore::new(&*self.store, self.model.path_arity(), self.model.hash_size());
        self.root.delete_prefix(&node_store, digits.as_slice())?;
        Ok(())
    }

    /// Wipes every entry except the root's own identity terminal.
    pub fn clear(&mut self) {
        self.root.children = BTreeMap::new();
        self.root.commitment = None;
    }

    /// Commits the buffered overlay: recomputes commitments bottom-up,
    /// writes every dirty node and newly-pending value, and returns the new
    /// root commitment. The overlay is consumed — subsequent mutations start
    /// from a freshly-fetched view of the committed state.
    pub fn commit(&mut self) -> Result<VCommitment, TrieError> {
        let arity = self.model.path_arity();
        let hash_size = self.model.hash_size();
        let new_root = self.root.commit(&self.model, self.store, arity, hash_size)?;

        let node_store = NodeStore::new(&*self.store, arity, hash_size);
        let data = node_store
            .fetch_node_data(new_root.as_bytes())?
            .expect("just-committed root must be readable back");
        self.root = BufferedNode::from_node_data(data, Vec::new());
        Ok(new_root)
    }
}
