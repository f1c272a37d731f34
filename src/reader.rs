// Authenticated radix-trie key/value store.
//
// SPDX-License-Identifier: Apache-2.0

//! Read-side trie (spec component F): lookup, membership, ordered
//! iteration, prefix iteration, and snapshotting, all parameterized by a
//! fixed root commitment.

use crate::commitment::{CommitmentModel, VCommitment};
use crate::error::TrieError;
use crate::kv::{partitioned_key, KVReader, KVWriter, PARTITION_TRIE_NODES, PARTITION_VALUES};
use crate::node::NodeData;
use crate::path::{self, Digit};
use crate::store::NodeStore;
use crate::traverse::{self, Ending};

/// A trie view pinned to one root commitment, borrowing a [`KVReader`] and
/// a [`CommitmentModel`] (spec.md §3 "Ownership").
pub struct TrieReader<'s, R: KVReader, M: CommitmentModel> {
    store: NodeStore<'s, R>,
    model: M,
    root: VCommitment,
}

impl<'s, R: KVReader, M: CommitmentModel> TrieReader<'s, R, M> {
    pub fn new(reader: &'s R, model: M, root: VCommitment) -> Self {
        let store = NodeStore::new(reader, model.path_arity(), model.hash_size());
        TrieReader { store, model, root }
    }

    pub fn root(&self) -> &VCommitment { &self.root }

    pub fn model(&self) -> &M { &self.model }

    /// Returns the value stored at `key`, or `None` if absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        let digits = path::unpack(key, self.model.path_arity());
        let mut remaining: &[Digit] = digits.as_slice();
        let mut path_prefix: Vec<Digit> = Vec::new();
        let mut commitment = self.root.clone();

        loop {
            let node = self
                .store
                .fetch_node_data_with_key(commitment.as_bytes(), &path_prefix)?
                .ok_or_else(|| TrieError::CorruptStore(format!("missing node for commitment {commitment:?}")))?;

            let s = traverse::step(&node.path_fragment, remaining);
            match s.ending {
                Ending::Terminal => {
                    return match node.terminal {
                        None => Ok(None),
                        Some(t) => self.resolve_terminal_value(&t, key),
                    };
                }
                Ending::Split => return Ok(None),
                Ending::None => {
                    let digit = s.next_digit.expect("None ending always carries next_digit");
                    match node.children.get(&digit) {
                        None => return Ok(None), // Ending::Extend
                        Some(child) => {
                            path_prefix.extend_from_slice(&node.path_fragment);
                            path_prefix.push(digit);
                            remaining = &remaining[s.fragment_consumed + 1..];
                            commitment = child.clone();
                        }
                    }
                }
                Ending::Extend => unreachable!("traverse::step never returns Extend directly"),
            }
        }
    }

    pub fn has(&self, key: &[u8]) -> Result<bool, TrieError> { Ok(self.get(key)?.is_some()) }

    /// Recovers the plaintext value behind a terminal: either inlined
    /// literally in the commitment (`value_in_commitment`), or externalized
    /// and keyed by the full user key. `costly` terminals are externalized
    /// exactly like ordinary large ones — the engine performs no garbage
    /// collection (spec.md §1 Non-goals), so "never externalized" has no
    /// observable read-path effect here; `costly` only marks, for any future
    /// GC policy, values that must not be pruned independently of the node
    /// (see `DESIGN.md`).
    fn resolve_terminal_value(
        &self,
        terminal: &crate::commitment::TCommitment,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, TrieError> {
        if terminal.value_in_commitment {
            return Ok(Some(terminal.raw.clone()));
        }
        self.store
            .fetch_externalized_value(key)
            .map(Some)
            .ok_or_else(|| TrieError::CorruptStore(format!("externalized value missing for key {key:?}")))
    }

    /// Depth-first, ascending-digit-order visit of every `(key, value)` pair
    /// in the subtree rooted at this reader's root. `visit` returning
    /// `false` stops iteration early (spec.md §5).
    pub fn iterate(&self, visit: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> Result<(), TrieError> {
        self.walk_subtree(self.root.clone(), Vec::new(), visit)
    }

    /// Iterates only the entries whose key has `prefix` as a prefix,
    /// descending to the deepest node whose accumulated key-plus-fragment
    /// already contains `prefix`, then iterating that subtree (spec.md
    /// §4.F).
    pub fn iterate_prefix(
        &self,
        prefix: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<(), TrieError> {
        let prefix_digits = path::unpack(prefix, self.model.path_arity());
        let mut remaining: &[Digit] = prefix_digits.as_slice();
        let mut path_prefix: Vec<Digit> = Vec::new();
        let mut commitment = self.root.clone();

        loop {
            let node = self
                .store
                .fetch_node_data_with_key(commitment.as_bytes(), &path_prefix)?
                .ok_or_else(|| TrieError::CorruptStore(format!("missing node for commitment {commitment:?}")))?;

            let shared =
                node.path_fragment.iter().zip(remaining.iter()).take_while(|(a, b)| a == b).count();

            if shared == remaining.len() {
                // The whole remaining prefix is consumed by (or within) this
                // node's fragment: everything below is in scope.
                let mut accumulated = path_prefix.clone();
                accumulated.extend_from_slice(&node.path_fragment);
                return self.walk_node(node, accumulated, visit);
            }

            if shared < node.path_fragment.len() {
                // Fragment diverges from the requested prefix: nothing matches.
                return Ok(());
            }

            let digit = remaining[shared];
            match node.children.get(&digit) {
                None => return Ok(()),
                Some(child) => {
                    path_prefix.extend_from_slice(&node.path_fragment);
                    path_prefix.push(digit);
                    remaining = &remaining[shared + 1..];
                    commitment = child.clone();
                }
            }
        }
    }

    fn walk_subtree(
        &self,
        commitment: VCommitment,
        path_prefix: Vec<Digit>,
        visit: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<(), TrieError> {
        let node = self
            .store
            .fetch_node_data_with_key(commitment.as_bytes(), &path_prefix)?
            .ok_or_else(|| TrieError::CorruptStore(format!("missing node for commitment {commitment:?}")))?;
        let mut accumulated = path_prefix;
        accumulated.extend_from_slice(&node.path_fragment);
        self.walk_node(node, accumulated, visit)
    }

    fn walk_node(
        &self,
        node: NodeData,
        accumulated: Vec<Digit>,
        visit: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<(), TrieError> {
        if let Some(terminal) = &node.terminal {
            let key_bytes = path::pack(&accumulated, self.model.path_arity())
                .map_err(|e| TrieError::CorruptStore(e.to_string()))?;
            let value = self
                .resolve_terminal_value(terminal, &key_bytes)?
                .ok_or_else(|| TrieError::CorruptStore("terminal present but value missing".into()))?;
            if !visit(&key_bytes, &value) {
                return Ok(());
            }
        }

        for (&digit, child_commitment) in node.children.iter() {
            let mut next = accumulated.clone();
            next.push(digit);
            self.walk_subtree(child_commitment.clone(), next, visit)?;
        }

        Ok(())
    }

    /// Emits both partitions for the subtree rooted at this reader's root
    /// into `dest` (spec.md §4.F, using the KV-stream codec of §6).
    pub fn snapshot(&self, dest: &mut dyn KVWriter) -> Result<(), TrieError> {
        self.snapshot_subtree(self.root.clone(), Vec::new(), dest)
    }

    fn snapshot_subtree(
        &self,
        commitment: VCommitment,
        path_prefix: Vec<Digit>,
        dest: &mut dyn KVWriter,
    ) -> Result<(), TrieError> {
        let node = self
            .store
            .fetch_node_data_with_key(commitment.as_bytes(), &path_prefix)?
            .ok_or_else(|| TrieError::CorruptStore(format!("missing node for commitment {commitment:?}")))?;

        let take_terminal_from_value = node.take_terminal_from_value(&self.model);
        let encoded = node.encode(self.model.path_arity(), self.model.hash_size(), take_terminal_from_value);
        dest.set(&partitioned_key(PARTITION_TRIE_NODES, commitment.as_bytes()), &encoded);

        let mut accumulated = path_prefix.clone();
        accumulated.extend_from_slice(&node.path_fragment);

        if let Some(terminal) = &node.terminal {
            if !terminal.value_in_commitment {
                let key_bytes = path::pack(&accumulated, self.model.path_arity())
                    .map_err(|e| TrieError::CorruptStore(e.to_string()))?;
                if let Some(value) = self.store.fetch_externalized_value(&key_bytes) {
                    dest.set(&partitioned_key(PARTITION_VALUES, &key_bytes), &value);
                }
            }
        }

        for (&digit, child_commitment) in node.children.iter() {
            let mut next = accumulated.clone();
            next.push(digit);
            self.snapshot_subtree(child_commitment.clone(), next, dest)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::commitment::Blake2bModel;
    use crate::identity::must_init_root;
    use crate::kv::MemoryStore;
    use crate::path::PathArity;
    use crate::updatable::TrieUpdatable;

    fn build(entries: &[(&str, &str)]) -> (MemoryStore, Blake2bModel, VCommitment) {
        let model = Blake2bModel::new(PathArity::Byte, crate::commitment::HashSize::Bits160, 32);
        let mut store = MemoryStore::new();
        let root = must_init_root(&mut store, &model, b"identity-bytes").unwrap();
        let mut trie = TrieUpdatable::new(&mut store, model.clone(), root).unwrap();
        for (k, v) in entries {
            trie.update(k.as_bytes(), v.as_bytes()).unwrap();
        }
        let root = trie.commit().unwrap();
        (store, model, root)
    }

    #[test]
    fn get_and_has_after_insert() {
        let (store, model, root) = build(&[("key", "value")]);
        let reader = TrieReader::new(&store, model, root);
        assert_eq!(reader.get(b"").unwrap(), Some(b"identity-bytes".to_vec()));
        assert_eq!(reader.get(b"key").unwrap(), Some(b"value".to_vec()));
        assert!(!reader.has(b"missing").unwrap());
    }

    #[test]
    fn iterate_visits_every_terminal() {
        let (store, model, root) = build(&[("a", "1"), ("ab", "2"), ("abc", "3")]);
        let reader = TrieReader::new(&store, model, root);
        let mut seen = Vec::new();
        reader
            .iterate(&mut |k, v| {
                seen.push((k.to_vec(), v.to_vec()));
                true
            })
            .unwrap();
        // root's own identity terminal at "" plus the three inserted keys.
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn iterate_prefix_is_closed_under_prefix() {
        let (store, model, root) =
            build(&[("a", "1"), ("ab", "2"), ("ac", "3"), ("abcd", "4"), ("z", "5")]);
        let reader = TrieReader::new(&store, model, root);
        let mut seen = Vec::new();
        reader
            .iterate_prefix(b"ab", &mut |k, _| {
                seen.push(k.to_vec());
                true
            })
            .unwrap();
        assert!(seen.iter().all(|k| k.starts_with(b"ab")));
        assert_eq!(seen.len(), 2);
    }
}
