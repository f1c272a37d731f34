// Authenticated radix-trie key/value store.
//
// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenarios from spec.md §8, exercised against every
//! (arity, hash-size) combination the crate supports, via the public API
//! only (no internal module access) — the integration-test counterpart to
//! the unit tests colocated with each module.

use trie256::commitment::{Blake2bModel, CommitmentModel, HashSize};
use trie256::error::TrieError;
use trie256::identity::must_init_root;
use trie256::kv::MemoryStore;
use trie256::path::PathArity;
use trie256::proof::merkle;
use trie256::store::NodeStore;
use trie256::{TrieReader, TrieUpdatable};

fn all_models() -> Vec<Blake2bModel> {
    let mut models = Vec::new();
    for arity in [PathArity::Bit, PathArity::Nibble, PathArity::Byte] {
        for hash_size in [HashSize::Bits160, HashSize::Bits256] {
            models.push(Blake2bModel::new(arity, hash_size, 32));
        }
    }
    models
}

/// Scenario 1: insertion/lookup.
#[test]
fn insertion_and_lookup() -> Result<(), TrieError> {
    let model = Blake2bModel::new(PathArity::Bit, HashSize::Bits160, 32);
    let mut store = MemoryStore::new();
    let root0 = must_init_root(&mut store, &model, b"idIDidIDidID")?;
    let mut trie = TrieUpdatable::new(&mut store, model.clone(), root0)?;
    trie.update(b"key", b"value")?;
    let root1 = trie.commit()?;

    let reader = TrieReader::new(&store, model, root1);
    assert_eq!(reader.get(b"")?, Some(b"idIDidIDidID".to_vec()));
    assert_eq!(reader.get(b"key")?, Some(b"value".to_vec()));
    assert!(!reader.has(b"missing")?);
    Ok(())
}

/// Scenario 2: order independence, across every (arity, hash-size) pair.
#[test]
fn order_independence_across_all_models() -> Result<(), TrieError> {
    let keys = ["a", "ab", "abc", "abcd", "abcde"];
    for model in all_models() {
        let mut store1 = MemoryStore::new();
        let root0a = must_init_root(&mut store1, &model, b"same-identity")?;
        let mut t1 = TrieUpdatable::new(&mut store1, model.clone(), root0a)?;
        for k in &keys {
            t1.update(k.as_bytes(), b"v")?;
        }
        let root1 = t1.commit()?;

        let mut store2 = MemoryStore::new();
        let root0b = must_init_root(&mut store2, &model, b"same-identity")?;
        let mut t2 = TrieUpdatable::new(&mut store2, model.clone(), root0b)?;
        for k in keys.iter().rev() {
            t2.update(k.as_bytes(), b"v")?;
        }
        let root2 = t2.commit()?;

        assert_eq!(root1, root2, "order independence failed for {model:?}");
    }
    Ok(())
}

/// Scenario 3: proofs of presence and absence.
#[test]
fn proofs_of_presence_and_absence() -> Result<(), TrieError> {
    let model = Blake2bModel::new(PathArity::Byte, HashSize::Bits160, 32);
    let mut store = MemoryStore::new();
    let root0 = must_init_root(&mut store, &model, b"identity")?;
    let mut trie = TrieUpdatable::new(&mut store, model.clone(), root0)?;
    for (k, v) in [("a", "1"), ("ab", "2"), ("ac", "3"), ("abc", "4"), ("abd", "5"), ("ad", "6")] {
        trie.update(k.as_bytes(), v.as_bytes())?;
    }
    let root = trie.commit()?;

    let node_store = NodeStore::new(&store, model.path_arity(), model.hash_size());
    for key in ["a", "ab", "ac", "abc", "abd", "ad"] {
        let proof = merkle::build(&node_store, &model, &root, key.as_bytes())?;
        merkle::validate(&proof, &root).expect("presence proof must validate");
        assert!(!merkle::is_proof_of_absence(&proof));
    }
    for key in ["1", "2", "12345", "ab+"] {
        let proof = merkle::build(&node_store, &model, &root, key.as_bytes())?;
        merkle::validate(&proof, &root).expect("absence proof must validate");
        assert!(merkle::is_proof_of_absence(&proof));
    }
    Ok(())
}

/// Scenario 4: delete then re-insert reaches the same root.
#[test]
fn delete_then_reinsert_matches_original_root() -> Result<(), TrieError> {
    let model = Blake2bModel::new(PathArity::Nibble, HashSize::Bits256, 32);
    let mut store = MemoryStore::new();
    let root0 = must_init_root(&mut store, &model, b"identity-x")?;

    let mut trie = TrieUpdatable::new(&mut store, model.clone(), root0)?;
    trie.update(b"a", b"1")?;
    trie.update(b"ab", b"2")?;
    let root_after_insert = trie.commit()?;

    trie.delete(b"a")?;
    trie.commit()?;
    trie.delete(b"ab")?;
    trie.commit()?;

    trie.update(b"a", b"1")?;
    trie.update(b"ab", b"2")?;
    let root_reinserted = trie.commit()?;

    assert_eq!(root_after_insert, root_reinserted);
    Ok(())
}

/// Scenario 5: delete-prefix removes only matching keys.
#[test]
fn delete_prefix_removes_only_matching_keys() -> Result<(), TrieError> {
    let model = Blake2bModel::new(PathArity::Byte, HashSize::Bits160, 32);
    let mut store = MemoryStore::new();
    let root0 = must_init_root(&mut store, &model, b"identity")?;
    let mut trie = TrieUpdatable::new(&mut store, model.clone(), root0)?;
    for (k, v) in
        [("a", "1"), ("ab", "2"), ("ac", "3"), ("abcd", "4"), ("abra", "5"), ("aaa", "6"), ("klmn", "7")]
    {
        trie.update(k.as_bytes(), v.as_bytes())?;
    }
    trie.commit()?;

    trie.delete_prefix(b"ab")?;
    let root = trie.commit()?;

    let reader = TrieReader::new(&store, model, root);
    assert_eq!(reader.get(b"ab")?, None);
    assert_eq!(reader.get(b"abcd")?, None);
    assert_eq!(reader.get(b"abra")?, None);
    assert_eq!(reader.get(b"a")?, Some(b"1".to_vec()));
    assert_eq!(reader.get(b"ac")?, Some(b"3".to_vec()));
    assert_eq!(reader.get(b"aaa")?, Some(b"6".to_vec()));
    assert_eq!(reader.get(b"klmn")?, Some(b"7".to_vec()));
    Ok(())
}

/// Scenario 5b (spec.md §8 property P10): deleting a prefix in one call
/// matches deleting every matching key individually.
#[test]
fn delete_prefix_equivalent_to_individual_deletes() -> Result<(), TrieError> {
    let model = Blake2bModel::new(PathArity::Byte, HashSize::Bits160, 32);
    let entries =
        [("a", "1"), ("ab", "2"), ("ac", "3"), ("abcd", "4"), ("abra", "5"), ("aaa", "6"), ("klmn", "7")];
    let prefixed: Vec<&str> = entries.iter().map(|(k, _)| *k).filter(|k| k.starts_with("ab")).collect();

    let mut store_bulk = MemoryStore::new();
    let root0 = must_init_root(&mut store_bulk, &model, b"identity")?;
    let mut bulk = TrieUpdatable::new(&mut store_bulk, model.clone(), root0)?;
    for (k, v) in entries {
        bulk.update(k.as_bytes(), v.as_bytes())?;
    }
    bulk.commit()?;
    bulk.delete_prefix(b"ab")?;
    let bulk_root = bulk.commit()?;

    let mut store_individual = MemoryStore::new();
    let root0 = must_init_root(&mut store_individual, &model, b"identity")?;
    let mut individual = TrieUpdatable::new(&mut store_individual, model.clone(), root0)?;
    for (k, v) in entries {
        individual.update(k.as_bytes(), v.as_bytes())?;
    }
    individual.commit()?;
    for k in prefixed {
        individual.delete(k.as_bytes())?;
    }
    let individual_root = individual.commit()?;

    assert_eq!(bulk_root, individual_root);
    Ok(())
}

/// Scenario 6: value-inlining boundary at the hash-size threshold.
#[test]
fn value_inlining_boundary() -> Result<(), TrieError> {
    let model = Blake2bModel::new(PathArity::Byte, HashSize::Bits160, 32);
    let mut store = MemoryStore::new();
    let root0 = must_init_root(&mut store, &model, b"identity")?;
    let mut trie = TrieUpdatable::new(&mut store, model.clone(), root0)?;

    let small = b"123456789012345678"; // 18 bytes <= 20-byte hash size.
    let large = vec![9u8; 21]; // 21 bytes > hash size.
    trie.update(b"k", small)?;
    trie.update(b"k2", &large)?;
    let root = trie.commit()?;

    let reader = TrieReader::new(&store, model, root);
    assert_eq!(reader.get(b"k")?, Some(small.to_vec()));
    assert_eq!(reader.get(b"k2")?, Some(large));
    Ok(())
}

/// Property P9: every entry visited by `iterate_prefix` carries the prefix,
/// and the count matches the full set filtered by prefix.
#[test]
fn prefix_iteration_is_closed_and_exhaustive() -> Result<(), TrieError> {
    let model = Blake2bModel::new(PathArity::Byte, HashSize::Bits160, 32);
    let mut store = MemoryStore::new();
    let root0 = must_init_root(&mut store, &model, b"identity")?;
    let mut trie = TrieUpdatable::new(&mut store, model.clone(), root0)?;
    let entries = [("a", "1"), ("ab", "2"), ("ac", "3"), ("abcd", "4"), ("z", "5")];
    for (k, v) in entries {
        trie.update(k.as_bytes(), v.as_bytes())?;
    }
    let root = trie.commit()?;

    let reader = TrieReader::new(&store, model, root);
    let mut all = Vec::new();
    reader.iterate(&mut |k, _| {
        all.push(k.to_vec());
        true
    })?;
    let expected_count = all.iter().filter(|k| k.starts_with(b"ab")).count();

    let mut seen = Vec::new();
    reader.iterate_prefix(b"ab", &mut |k, _| {
        seen.push(k.to_vec());
        true
    })?;
    assert!(seen.iter().all(|k| k.starts_with(b"ab")));
    assert_eq!(seen.len(), expected_count);
    Ok(())
}
