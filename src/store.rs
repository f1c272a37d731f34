// Authenticated radix-trie key/value store.
//
// SPDX-License-Identifier: Apache-2.0

//! Node store (spec component E): a cached, partitioned reader over the
//! caller's [`KVReader`], decoding node records and resolving externalized
//! terminals on demand.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::commitment::{HashSize, TCommitment};
use crate::error::TrieError;
use crate::kv::{partitioned_key, KVReader, PARTITION_TRIE_NODES, PARTITION_VALUES};
use crate::node::NodeData;
use crate::path::{Digit, PathArity};

/// Default cache bound, purged wholesale on overflow (spec.md 4.E).
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 4096;

/// Reads and decodes trie nodes from a partitioned backing store, caching
/// decoded records by their commitment bytes.
///
/// The cache is interior-mutable (`RefCell`) because `fetchNodeData` is
/// logically a read that happens to memoize: every other API in this crate
/// that holds a `&NodeStore` needs to fetch through shared references, the
/// same shape `commit_verify`'s own lookup caches take.
pub struct NodeStore<'s, R: KVReader> {
    reader: &'s R,
    arity: PathArity,
    hash_size: HashSize,
    cache: RefCell<HashMap<Vec<u8>, NodeData>>,
    cache_max_entries: usize,
}

impl<'s, R: KVReader> NodeStore<'s, R> {
    pub fn new(reader: &'s R, arity: PathArity, hash_size: HashSize) -> Self {
        Self::with_cache_bound(reader, arity, hash_size, DEFAULT_CACHE_MAX_ENTRIES)
    }

    pub fn with_cache_bound(
        reader: &'s R,
        arity: PathArity,
        hash_size: HashSize,
        cache_max_entries: usize,
    ) -> Self {
        NodeStore { reader, arity, hash_size, cache: RefCell::new(HashMap::new()), cache_max_entries }
    }

    pub fn arity(&self) -> PathArity { self.arity }

    pub fn hash_size(&self) -> HashSize { self.hash_size }

    /// Fetches and decodes the node committed to by `commitment`, consulting
    /// the cache first. `Ok(None)` means the store has no such node
    /// (distinct from a decode error, which is `Err`).
    ///
    /// Cannot resolve a `takeTerminalFromValue` node, since that requires
    /// the node's full trie key, which this method's caller does not carry;
    /// use [`NodeStore::fetch_node_data_with_key`] when the caller is
    /// descending a known key path (reader, updatable overlay, proof
    /// builder all are).
    pub fn fetch_node_data(&self, commitment: &[u8]) -> Result<Option<NodeData>, TrieError> {
        if let Some(cached) = self.cache.borrow().get(commitment) {
            return Ok(Some(cached.clone()));
        }

        let key = partitioned_key(PARTITION_TRIE_NODES, commitment);
        let Some(bytes) = self.reader.get(&key) else {
            return Ok(None);
        };

        let node = NodeData::decode(&bytes, self.arity, self.hash_size, || None)
            .map_err(|e| TrieError::CorruptStore(e.to_string()))?;

        self.insert_cache(commitment.to_vec(), node.clone());
        Ok(Some(node))
    }

    /// Resolves a node whose codec may declare `takeTerminalFromValue`,
    /// given `path_prefix`: the digits accumulated from the root down to
    /// (but not including) this node, which the caller tracks during its
    /// descent. Combined with this node's own just-decoded path fragment,
    /// that yields the node's full trie key, used to look up the
    /// externalized value (spec.md 4.D, 4.E).
    pub fn fetch_node_data_with_key(
        &self,
        commitment: &[u8],
        path_prefix: &[Digit],
    ) -> Result<Option<NodeData>, TrieError> {
        if let Some(cached) = self.cache.borrow().get(commitment) {
            return Ok(Some(cached.clone()));
        }

        let key = partitioned_key(PARTITION_TRIE_NODES, commitment);
        let Some(bytes) = self.reader.get(&key) else {
            return Ok(None);
        };

        let node = NodeData::decode(&bytes, self.arity, self.hash_size, |path_fragment| {
            let mut full_digits = path_prefix.to_vec();
            full_digits.extend_from_slice(path_fragment);
            self.fetch_externalized_terminal(&full_digits)
        })
        .map_err(|e| TrieError::CorruptStore(e.to_string()))?;

        self.insert_cache(commitment.to_vec(), node.clone());
        Ok(Some(node))
    }

    fn full_key_bytes(&self, full_digits: &[Digit]) -> Option<Vec<u8>> {
        crate::path::pack(full_digits, self.arity).ok()
    }

    /// `costly: false` is always correct here, never a loss of information:
    /// a node only ever declares `takeTerminalFromValue` for a terminal that
    /// was non-costly at commit time (see `NodeData::take_terminal_from_value`),
    /// so re-derivation through this path can never apply to a terminal that
    /// was actually costly.
    fn fetch_externalized_terminal(&self, full_digits: &[Digit]) -> Option<TCommitment> {
        let key_bytes = self.full_key_bytes(full_digits)?;
        let key = partitioned_key(PARTITION_VALUES, &key_bytes);
        let value = self.reader.get(&key)?;
        Some(TCommitment {
            raw: crate::digest::hash_bytes(&value, self.hash_size),
            value_in_commitment: false,
            costly: false,
        })
    }

    /// Reads an externalized value by its full trie key, for callers
    /// (`TrieReader::get`) that need the raw bytes rather than a recomputed
    /// terminal hash. Used for both ordinary and `costly` externalized
    /// terminals: both are keyed by the (restructure-stable) full user key,
    /// never by the node's own commitment, which changes across merges and
    /// splits (see `src/reader.rs::resolve_terminal_value`).
    pub fn fetch_externalized_value(&self, full_key: &[u8]) -> Option<Vec<u8>> {
        let key = partitioned_key(PARTITION_VALUES, full_key);
        self.reader.get(&key)
    }

    fn insert_cache(&self, commitment: Vec<u8>, node: NodeData) {
        let mut cache = self.cache.borrow_mut();
        if cache.len() >= self.cache_max_entries {
            cache.clear();
        }
        cache.insert(commitment, node);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::commitment::{Blake2bModel, CommitmentModel};
    use crate::kv::{KVWriter, MemoryStore};

    #[test]
    fn fetch_missing_node_returns_none() {
        let store = MemoryStore::new();
        let node_store = NodeStore::new(&store, PathArity::Byte, HashSize::Bits160);
        assert!(node_store.fetch_node_data(&[0u8; 20]).unwrap().is_none());
    }

    #[test]
    fn fetch_roundtrips_through_cache() {
        let model = Blake2bModel::new(PathArity::Byte, HashSize::Bits160, 32);
        let mut backing = MemoryStore::new();
        let mut node = NodeData::new(vec![]);
        node.terminal = Some(model.commit_to_data(b"hello"));
        let commitment = model.calc_node_commitment(&node);
        let encoded = node.encode(PathArity::Byte, HashSize::Bits160, false);
        backing.set(&partitioned_key(PARTITION_TRIE_NODES, commitment.as_bytes()), &encoded);

        let node_store = NodeStore::new(&backing, PathArity::Byte, HashSize::Bits160);
        let fetched = node_store.fetch_node_data(commitment.as_bytes()).unwrap().unwrap();
        assert_eq!(fetched.terminal, node.terminal);
        // Second fetch should hit the cache and still agree.
        let fetched_again = node_store.fetch_node_data(commitment.as_bytes()).unwrap().unwrap();
        assert_eq!(fetched_again, fetched);
    }

    #[test]
    fn cache_purges_wholesale_on_overflow() {
        let backing = MemoryStore::new();
        let node_store = NodeStore::with_cache_bound(&backing, PathArity::Byte, HashSize::Bits160, 1);
        node_store.insert_cache(vec![1], NodeData::new(vec![]));
        assert_eq!(node_store.cache.borrow().len(), 1);
        node_store.insert_cache(vec![2], NodeData::new(vec![]));
        // Overflowing a bound of 1 purges everything before inserting the new entry.
        assert_eq!(node_store.cache.borrow().len(), 1);
        assert!(node_store.cache.borrow().contains_key(&vec![2]));
    }
}
