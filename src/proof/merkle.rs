// Authenticated radix-trie key/value store.
//
// SPDX-License-Identifier: Apache-2.0

//! Concrete Merkle proof format and standalone verifier for the Blake2b
//! commitment model (spec component I).
//!
//! Security-critical: [`validate`] and [`validate_with_terminal`] depend
//! only on [`crate::commitment::Blake2bModel`] and this module's plain data
//! — never on [`crate::reader::TrieReader`], [`crate::store::NodeStore`], or
//! any other trie type, so a verifier can be compiled and audited with none
//! of the mutation machinery in scope. They never panic on malformed input;
//! every failure is a [`ProofError`].

use std::collections::BTreeMap;

use crate::commitment::{Blake2bModel, CommitmentModel, HashSize, VCommitment};
use crate::error::ProofError;
use crate::kv::KVReader;
use crate::path::{self, Digit, PathArity};
use crate::proof::{self, GenericProof};
use crate::store::NodeStore;
use crate::traverse::Ending;

/// One step of a [`MerkleProof`] path (spec.md §4.I).
///
/// `children` omits the one child commitment the verifier reconstructs
/// recursively — for every non-last element that is the child actually
/// descended into (`child_index`); for the last element nothing is omitted,
/// since `child_index` there names a slot being asserted empty, a terminal,
/// or the path-fragment slot rather than a child to recurse into.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct MerkleProofElement {
    /// Digits stored at this node.
    pub path_fragment: Vec<Digit>,
    /// Sibling (and, for the last element, all) child commitments, keyed by
    /// digit.
    pub children: BTreeMap<Digit, Vec<u8>>,
    /// This node's terminal commitment bytes, if it has one.
    pub terminal: Option<Vec<u8>>,
    /// The slot index "pointed at" by the next step, or by the proof's
    /// overall conclusion if this is the last element.
    pub child_index: Digit,
}

/// A self-contained Merkle proof for one key against one commitment model
/// configuration (spec.md §4.I / §6).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct MerkleProof {
    /// Path arity the proof was built under.
    pub path_arity: PathArity,
    /// Commitment hash width the proof was built under.
    pub hash_size: HashSize,
    /// The key this proof covers, as raw bytes (not digits).
    pub key: Vec<u8>,
    /// Root-to-leaf path of proof elements.
    pub path: Vec<MerkleProofElement>,
}

/// Builds a [`MerkleProof`] for `key` against `root`, using the generic
/// proof walk (spec component H) and mapping its output into the Blake2b-
/// concrete wire format (spec component I).
pub fn build<R: KVReader>(
    store: &NodeStore<R>,
    model: &Blake2bModel,
    root: &VCommitment,
    key: &[u8],
) -> Result<MerkleProof, crate::error::TrieError> {
    let generic = proof::build(store, model, root, key)?;
    Ok(from_generic(model, key, generic))
}

fn from_generic(model: &Blake2bModel, key: &[u8], generic: GenericProof) -> MerkleProof {
    let arity = model.path_arity();
    let n = generic.steps.len();
    let mut path = Vec::with_capacity(n);

    for (i, step) in generic.steps.into_iter().enumerate() {
        let is_last = i + 1 == n;
        let child_index = if is_last {
            match generic.ending {
                Ending::Terminal => proof::terminal_commitment_index(arity),
                Ending::Split => proof::path_fragment_commitment_index(arity),
                // The absent child's own digit is a valid, directly-checkable
                // empty slot (spec.md §4.I bullet 1), so Extend keeps it
                // rather than also collapsing to the fragment slot (see
                // DESIGN.md for why this departs from 4.H's terser wording).
                Ending::Extend => step.child_digit,
                Ending::None => unreachable!("last step is never a None ending"),
            }
        } else {
            step.child_digit
        };

        let mut children: BTreeMap<Digit, Vec<u8>> = step
            .node
            .children
            .iter()
            .map(|(d, c)| (*d, c.as_bytes().to_vec()))
            .collect();
        if !is_last {
            children.remove(&child_index);
        }

        let terminal = step.node.terminal.as_ref().map(|t| t.as_bytes().to_vec());
        path.push(MerkleProofElement { path_fragment: step.node.path_fragment, children, terminal, child_index });
    }

    MerkleProof { path_arity: arity, hash_size: model.hash_size(), key: key.to_vec(), path }
}

/// Recomputes the root commitment implied by `proof` and checks it against
/// `root` (spec.md §4.I). Does not check the proof's terminal against any
/// particular value — use [`validate_with_terminal`] for that.
pub fn validate(proof: &MerkleProof, root: &VCommitment) -> Result<(), ProofError> {
    let n = proof.path.len();
    if n == 0 {
        return Err(ProofError::TruncatedPath);
    }
    let arity = proof.path_arity;
    let hash_size = proof.hash_size;
    let model = Blake2bModel::new(arity, hash_size, 0);
    let terminal_idx = proof::terminal_commitment_index(arity);
    let fragment_idx = proof::path_fragment_commitment_index(arity);
    let key_digits = path::unpack(&proof.key, arity);

    let mut key_idx = 0usize;
    for (i, elem) in proof.path.iter().enumerate() {
        let is_last = i + 1 == n;
        check_sizes(elem, hash_size)?;
        if !is_last {
            let remaining = &key_digits.as_slice()[key_idx.min(key_digits.len())..];
            if !remaining.starts_with(elem.path_fragment.as_slice()) {
                return Err(ProofError::KeyFragmentMismatch(i));
            }
            if elem.child_index as usize >= arity.arity() {
                return Err(ProofError::InvalidChildIndex(elem.child_index));
            }
            if elem.children.contains_key(&elem.child_index) {
                return Err(ProofError::UnexpectedChildCommitment(elem.child_index));
            }
            // The digit the key actually selects at this depth must be the
            // one the proof element claims to descend into — otherwise the
            // hash reconstruction below would substitute the recursed
            // commitment at `child_index` without ever having checked that
            // the key agrees with it, letting an altered key "ride along" a
            // proof built for a different key to the same root.
            let descent_digit = remaining.get(elem.path_fragment.len()).copied();
            if descent_digit != Some(elem.child_index) {
                return Err(ProofError::DescentDigitMismatch(i));
            }
            key_idx += elem.path_fragment.len() + 1;
        } else if (elem.child_index as usize) < arity.arity() {
            if elem.children.contains_key(&elem.child_index) {
                return Err(ProofError::UnexpectedChildCommitment(elem.child_index));
            }
        } else if elem.child_index != terminal_idx && elem.child_index != fragment_idx {
            return Err(ProofError::InvalidChildIndex(elem.child_index));
        }
    }

    let mut child_commitment: Option<Vec<u8>> = None;
    for elem in proof.path.iter().rev() {
        let mut children = elem.children.clone();
        if let Some(c) = child_commitment.take() {
            if children.contains_key(&elem.child_index) {
                return Err(ProofError::UnexpectedChildCommitment(elem.child_index));
            }
            children.insert(elem.child_index, c);
        }
        let compressed = model.compress_path_fragment(&elem.path_fragment);
        let computed = model.hash_vector(&children, elem.terminal.as_deref(), &compressed);
        child_commitment = Some(computed.as_bytes().to_vec());
    }

    let computed_root = child_commitment.expect("non-empty path always produces a commitment");
    if computed_root != root.as_bytes() {
        return Err(ProofError::RootMismatch);
    }
    Ok(())
}

fn check_sizes(elem: &MerkleProofElement, hash_size: HashSize) -> Result<(), ProofError> {
    for c in elem.children.values() {
        if c.len() > hash_size.as_usize() {
            return Err(ProofError::OversizedCommitment(c.len(), hash_size.as_usize()));
        }
    }
    if let Some(t) = &elem.terminal {
        if t.len() > hash_size.as_usize() {
            return Err(ProofError::OversizedCommitment(t.len(), hash_size.as_usize()));
        }
    }
    Ok(())
}

/// Returns `true` iff `proof`'s conclusion is a proof of absence: its last
/// element points at an empty child slot, or at the path-fragment slot, or
/// at the terminal slot with no terminal recorded (spec.md §4.I).
pub fn is_proof_of_absence(proof: &MerkleProof) -> bool {
    let Some(last) = proof.path.last() else { return true };
    let arity = proof.path_arity.arity();
    let terminal_idx = proof::terminal_commitment_index(proof.path_arity);

    if (last.child_index as usize) < arity {
        !last.children.contains_key(&last.child_index)
    } else if last.child_index == terminal_idx {
        last.terminal.is_none()
    } else {
        true // path-fragment slot: split/extend-by-fragment absence.
    }
}

/// Runs [`validate`], then additionally checks that the proof's terminal
/// equals `value`'s commitment under the model's inlining rule (spec.md
/// §4.I `validateWithTerminal`).
pub fn validate_with_terminal(
    proof: &MerkleProof,
    root: &VCommitment,
    value: &[u8],
) -> Result<(), ProofError> {
    validate(proof, root)?;
    let last = proof.path.last().ok_or(ProofError::TruncatedPath)?;
    let model = Blake2bModel::new(proof.path_arity, proof.hash_size, 0);
    let expected = model.commit_to_data(value);
    match &last.terminal {
        Some(t) if *t == expected.raw => Ok(()),
        _ => Err(ProofError::TerminalMismatch),
    }
}

impl MerkleProof {
    /// Encodes this proof per spec.md §6:
    /// `pathArity:1 | hashSize:1 | encodedKey:len16+bytes | pathCount:u16 | path[*]`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.path_arity.wire_tag());
        out.push(self.hash_size.wire_tag());
        out.extend_from_slice(&(self.key.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.key);
        out.extend_from_slice(&(self.path.len() as u16).to_le_bytes());
        for elem in &self.path {
            elem.encode(self.path_arity, &mut out);
        }
        out
    }

    /// Decodes a proof produced by [`MerkleProof::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, ProofError> {
        let mut cursor = 0usize;
        let arity_tag = *bytes.get(cursor).ok_or(ProofError::TruncatedPath)?;
        cursor += 1;
        let path_arity = PathArity::from_wire_tag(arity_tag).ok_or(ProofError::TruncatedPath)?;
        let hash_tag = *bytes.get(cursor).ok_or(ProofError::TruncatedPath)?;
        cursor += 1;
        let hash_size = HashSize::from_wire_tag(hash_tag).ok_or(ProofError::TruncatedPath)?;

        let key_len = read_u16(bytes, &mut cursor)? as usize;
        let key = bytes.get(cursor..cursor + key_len).ok_or(ProofError::TruncatedPath)?.to_vec();
        cursor += key_len;

        let count = read_u16(bytes, &mut cursor)? as usize;
        let mut path = Vec::with_capacity(count);
        for _ in 0..count {
            let (elem, used) = MerkleProofElement::decode(&bytes[cursor..], path_arity, hash_size)?;
            path.push(elem);
            cursor += used;
        }

        if cursor != bytes.len() {
            return Err(ProofError::NotAllBytesConsumed);
        }
        Ok(MerkleProof { path_arity, hash_size, key, path })
    }
}

impl MerkleProofElement {
    fn encode(&self, arity: PathArity, out: &mut Vec<u8>) {
        path::encode_digits_on_wire(&self.path_fragment, arity, out);
        out.extend_from_slice(&self.child_index.to_le_bytes());

        let mut flags = 0u8;
        if self.terminal.is_some() {
            flags |= 0b01;
        }
        if !self.children.is_empty() {
            flags |= 0b10;
        }
        out.push(flags);

        if let Some(t) = &self.terminal {
            out.push(t.len() as u8);
            out.extend_from_slice(t);
        }

        if !self.children.is_empty() {
            let mut bitmap = vec![0u8; 32];
            for &digit in self.children.keys() {
                let idx = digit as usize;
                bitmap[idx / 8] |= 1 << (idx % 8);
            }
            out.extend_from_slice(&bitmap);
            for commitment in self.children.values() {
                out.extend_from_slice(commitment);
            }
        }
    }

    fn decode(bytes: &[u8], arity: PathArity, hash_size: HashSize) -> Result<(Self, usize), ProofError> {
        let (fragment, rest) = path::decode_digits_on_wire(bytes, arity)?;
        let mut cursor = bytes.len() - rest.len();

        let child_index = read_u16(bytes, &mut cursor)?;
        let flags = *bytes.get(cursor).ok_or(ProofError::TruncatedPath)?;
        cursor += 1;

        let mut terminal = None;
        if flags & 0b01 != 0 {
            let len = *bytes.get(cursor).ok_or(ProofError::TruncatedPath)? as usize;
            cursor += 1;
            if len > hash_size.as_usize() {
                return Err(ProofError::OversizedCommitment(len, hash_size.as_usize()));
            }
            let t = bytes.get(cursor..cursor + len).ok_or(ProofError::TruncatedPath)?.to_vec();
            cursor += len;
            terminal = Some(t);
        }

        let mut children = BTreeMap::new();
        if flags & 0b10 != 0 {
            let bitmap = bytes.get(cursor..cursor + 32).ok_or(ProofError::TruncatedPath)?;
            cursor += 32;
            for idx in 0..(32 * 8) {
                let set = bitmap[idx / 8] & (1 << (idx % 8)) != 0;
                if !set {
                    continue;
                }
                if idx >= arity.arity() {
                    return Err(ProofError::TooManyChildren);
                }
                let end = cursor + hash_size.as_usize();
                let commitment = bytes.get(cursor..end).ok_or(ProofError::TruncatedPath)?.to_vec();
                children.insert(idx as Digit, commitment);
                cursor = end;
            }
        }

        Ok((MerkleProofElement { path_fragment: fragment.0, children, terminal, child_index }, cursor))
    }
}

fn read_u16(bytes: &[u8], cursor: &mut usize) -> Result<u16, ProofError> {
    let slice = bytes.get(*cursor..*cursor + 2).ok_or(ProofError::TruncatedPath)?;
    *cursor += 2;
    Ok(u16::from_le_bytes([slice[0], slice[1]]))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::identity::must_init_root;
    use crate::kv::MemoryStore;
    use crate::updatable::TrieUpdatable;

    fn build_trie(entries: &[(&str, &str)]) -> (MemoryStore, Blake2bModel, VCommitment) {
        let model = Blake2bModel::new(PathArity::Byte, HashSize::Bits160, 32);
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
    fn proof_of_presence_validates() {
        let (store, model, root) = build_trie(&[("a", "1"), ("ab", "2"), ("ac", "3"), ("abc", "4"), ("abd", "5"), ("ad", "6")]);
        let node_store = NodeStore::new(&store, model.path_arity(), model.hash_size());
        for key in ["a", "ab", "ac", "abc", "abd", "ad"] {
            let proof = build(&node_store, &model, &root, key.as_bytes()).unwrap();
            validate(&proof, &root).unwrap();
            assert!(!is_proof_of_absence(&proof), "key {key} should be present");
            validate_with_terminal(&proof, &root, key_value(key).as_bytes()).unwrap();
        }
    }

    fn key_value(key: &str) -> String {
        match key {
            "a" => "1".into(),
            "ab" => "2".into(),
            "ac" => "3".into(),
            "abc" => "4".into(),
            "abd" => "5".into(),
            "ad" => "6".into(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn proof_of_absence_validates() {
        let (store, model, root) = build_trie(&[("a", "1"), ("ab", "2"), ("ac", "3"), ("abc", "4"), ("abd", "5"), ("ad", "6")]);
        let node_store = NodeStore::new(&store, model.path_arity(), model.hash_size());
        for key in ["1", "2", "12345", "ab+"] {
            let proof = build(&node_store, &model, &root, key.as_bytes()).unwrap();
            validate(&proof, &root).unwrap();
            assert!(is_proof_of_absence(&proof), "key {key} should be absent");
        }
    }

    #[test]
    fn tampered_root_is_rejected() {
        let (store, model, root) = build_trie(&[("a", "1"), ("ab", "2")]);
        let node_store = NodeStore::new(&store, model.path_arity(), model.hash_size());
        let proof = build(&node_store, &model, &root, b"a").unwrap();
        let wrong_root = VCommitment(vec![0xFF; model.hash_size().as_usize()]);
        let err = validate(&proof, &wrong_root).unwrap_err();
        assert!(matches!(err, ProofError::RootMismatch));
    }

    #[test]
    fn altered_key_with_same_descent_shape_is_rejected() {
        // A proof built for "ab" has a root element whose fragment is empty,
        // so it descends on the key's first digit alone. Swapping that digit
        // for another byte must not still validate against the real root,
        // even though the proof's own recorded commitments are untouched.
        let (store, model, root) = build_trie(&[("ab", "2"), ("xb", "9")]);
        let node_store = NodeStore::new(&store, model.path_arity(), model.hash_size());
        let mut proof = build(&node_store, &model, &root, b"ab").unwrap();
        proof.key = b"Xb".to_vec();
        let err = validate(&proof, &root).unwrap_err();
        assert!(matches!(err, ProofError::DescentDigitMismatch(_)));
    }

    #[test]
    fn wrong_terminal_value_is_rejected() {
        let (store, model, root) = build_trie(&[("a", "1")]);
        let node_store = NodeStore::new(&store, model.path_arity(), model.hash_size());
        let proof = build(&node_store, &model, &root, b"a").unwrap();
        let err = validate_with_terminal(&proof, &root, b"not-the-value").unwrap_err();
        assert!(matches!(err, ProofError::TerminalMismatch));
    }

    #[test]
    fn proof_wire_roundtrip() {
        let (store, model, root) = build_trie(&[("a", "1"), ("ab", "2"), ("abc", "3")]);
        let node_store = NodeStore::new(&store, model.path_arity(), model.hash_size());
        let proof = build(&node_store, &model, &root, b"abc").unwrap();
        let bytes = proof.encode();
        let decoded = MerkleProof::decode(&bytes).unwrap();
        assert_eq!(decoded, proof);
        validate(&decoded, &root).unwrap();
    }
}
