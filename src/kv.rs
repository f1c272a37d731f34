// Authenticated radix-trie key/value store.
//
// SPDX-License-Identifier: Apache-2.0

//! Backing-store contracts the engine consumes (spec.md §6).
//!
//! Only the abstract `KVReader`/`KVWriter`/`KVIterator`/`BatchedWriter`
//! traits live here; concrete backing stores are external collaborators
//! (spec.md §1 Non-goals). The in-memory `MemoryStore` below exists purely
//! so the engine can be exercised in tests (SPEC_FULL.md component N) —
//! grounded on the pattern of throwaway in-memory doubles the teacher's own
//! `commit_verify` test modules build ad hoc, just factored into one shared
//! type since this crate's tests need it repeatedly.

use std::collections::BTreeMap;

/// Leading byte prefixing every key the engine writes, separating the trie
/// node records from externalized values within a single backing store.
pub const PARTITION_TRIE_NODES: u8 = 0x00;
/// Leading byte for externalized terminal values.
pub const PARTITION_VALUES: u8 = 0x01;
/// Reserved for future use; the engine never writes under this partition.
pub const PARTITION_RESERVED: u8 = 0x02;

/// Prefixes `key` with `partition`, producing the physical store key.
pub fn partitioned_key(partition: u8, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 1);
    out.push(partition);
    out.extend_from_slice(key);
    out
}

/// Read half of the store contract.
pub trait KVReader {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    fn has(&self, key: &[u8]) -> bool { self.get(key).is_some() }
}

/// Write half of the store contract. Setting an empty value deletes the key
/// (spec.md §6), mirroring the teacher's own convention of never modeling
/// deletion as a distinct method where the backing stores it targets treat
/// "empty value" and "absent key" identically.
pub trait KVWriter {
    fn set(&mut self, key: &[u8], value: &[u8]);

    fn delete(&mut self, key: &[u8]) { self.set(key, &[]); }
}

/// Ordered iteration over a store's entries. `visit` returning `false` stops
/// iteration early (spec.md §5 "cooperative iteration").
pub trait KVIterator {
    fn iterate(&self, visit: &mut dyn FnMut(&[u8], &[u8]) -> bool);

    /// Iterates only entries whose key starts with `prefix`.
    fn iterate_prefix(&self, prefix: &[u8], visit: &mut dyn FnMut(&[u8], &[u8]) -> bool) {
        self.iterate(&mut |k, v| {
            if k.starts_with(prefix) {
                visit(k, v)
            } else {
                true
            }
        });
    }
}

/// A batch of writes applied atomically from the caller's perspective
/// (spec.md §5). The engine's own commit routine is the sole producer of a
/// batch; a concrete store decides how atomicity is achieved.
pub trait BatchedWriter: KVWriter {
    type Error: std::fmt::Debug;

    fn commit(self) -> Result<(), Self::Error>;
}

/// Deterministic in-memory store used by unit and integration tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl KVReader for MemoryStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> { self.entries.get(key).cloned() }
}

impl KVWriter for MemoryStore {
    fn set(&mut self, key: &[u8], value: &[u8]) {
        if value.is_empty() {
            self.entries.remove(key);
        } else {
            self.entries.insert(key.to_vec(), value.to_vec());
        }
    }
}

impl KVIterator for MemoryStore {
    fn iterate(&self, visit: &mut dyn FnMut(&[u8], &[u8]) -> bool) {
        for (k, v) in &self.entries {
            if !visit(k, v) {
                break;
            }
        }
    }
}

/// A batch of pending writes over a [`MemoryStore`], applied on `commit`.
/// Since the store is in-memory, "atomic" just means "applied in one go
/// with no interleaved observation" — the teacher's own `BatchedWriter`-style
/// test doubles make the same simplification.
pub struct MemoryBatch<'s> {
    store: &'s mut MemoryStore,
    pending: Vec<(Vec<u8>, Vec<u8>)>,
}

impl<'s> MemoryBatch<'s> {
    pub fn new(store: &'s mut MemoryStore) -> Self { MemoryBatch { store, pending: Vec::new() } }
}

impl KVWriter for MemoryBatch<'_> {
    fn set(&mut self, key: &[u8], value: &[u8]) { self.pending.push((key.to_vec(), value.to_vec())); }
}

impl BatchedWriter for MemoryBatch<'_> {
    type Error = std::convert::Infallible;

    fn commit(self) -> Result<(), Self::Error> {
        for (k, v) in self.pending {
            self.store.set(&k, &v);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_empty_deletes() {
        let mut store = MemoryStore::new();
        store.set(b"k", b"v");
        assert_eq!(store.get(b"k"), Some(b"v".to_vec()));
        store.delete(b"k");
        assert_eq!(store.get(b"k"), None);
    }

    #[test]
    fn batch_applies_on_commit_only() {
        let mut store = MemoryStore::new();
        {
            let mut batch = MemoryBatch::new(&mut store);
            batch.set(b"a", b"1");
            batch.set(b"b", b"2");
            assert!(store.is_empty());
            batch.commit().unwrap();
        }
        assert_eq!(store.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(store.get(b"b"), Some(b"2".to_vec()));
    }

    #[test]
    fn iterate_prefix_filters() {
        let mut store = MemoryStore::new();
        store.set(b"ab", b"1");
        store.set(b"ac", b"2");
        store.set(b"z", b"3");
        let mut seen = Vec::new();
        store.iterate_prefix(b"a", &mut |k, _| {
            seen.push(k.to_vec());
            true
        });
        assert_eq!(seen, vec![b"ab".to_vec(), b"ac".to_vec()]);
    }

    #[test]
    fn partitioned_key_prefixes_byte() {
        assert_eq!(partitioned_key(PARTITION_TRIE_NODES, b"x"), vec![0x00, b'x']);
        assert_eq!(partitioned_key(PARTITION_VALUES, b"x"), vec![0x01, b'x']);
    }
}
