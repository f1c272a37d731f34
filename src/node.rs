// Authenticated radix-trie key/value store.
//
// SPDX-License-Identifier: Apache-2.0

//! In-memory node record and its compact binary codec (spec component D).
//!
//! The wire layout is fully bespoke (flag byte + bitmap + raw commitment
//! bytes) rather than expressed through a generic strict-encoding framework,
//! so it is hand-rolled here with direct `Vec<u8>` pushes/reads — the same
//! low-level style the teacher itself falls back to in its own id/encode
//! modules whenever a format is dictated byte-for-byte rather than derived.

use std::collections::BTreeMap;

use crate::commitment::{CommitmentModel, HashSize, TCommitment, VCommitment};
use crate::path::{Digit, PathArity};

/// smallFlags bits (spec.md §4.D).
mod flags {
    pub const TERMINAL_EXISTS: u8 = 0b0000_0001;
    pub const TAKE_TERMINAL_FROM_VALUE: u8 = 0b0000_0010;
    pub const SERIALIZE_CHILDREN: u8 = 0b0000_0100;
    pub const SERIALIZE_PATH_FRAGMENT: u8 = 0b0000_1000;
}

/// Number of bytes in the children bitmap (spec.md: "limit of the 32-byte
/// bitmap" covers up to 256 children).
const BITMAP_BYTES: usize = 32;

/// A trie node: its path fragment, sparse children, and optional terminal.
///
/// `commitment` is `None` whenever the node has been mutated since it was
/// last committed (spec.md §3 invariant: "cleared by any mutation").
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct NodeData {
    pub path_fragment: Vec<Digit>,
    pub children: BTreeMap<Digit, VCommitment>,
    pub terminal: Option<TCommitment>,
    pub commitment: Option<VCommitment>,
}

/// Decoding failure for a node record (contributes to spec.md
/// `ErrCorruptStore` / `ErrNotAllBytesConsumed`).
#[derive(Clone, Eq, PartialEq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum NodeDecodeError {
    /// node record is empty.
    Empty,

    /// node record declares zero flags, which is never valid.
    ZeroFlags,

    /// node record is truncated while reading {0}.
    Truncated(&'static str),

    /// node record has {0} trailing bytes after a well-formed record.
    TrailingBytes(usize),

    /// a terminal in the record claims length {0}, exceeding the 32-byte
    /// maximum.
    OversizedTerminal(usize),
}

impl NodeData {
    pub fn new(path_fragment: Vec<Digit>) -> Self {
        NodeData { path_fragment, ..Default::default() }
    }

    /// Whether this node's terminal, if any, should be omitted from its own
    /// encoded record and reconstructed instead by rehashing the
    /// externalized value at decode time (spec.md §4.D `takeTerminalFromValue`).
    ///
    /// Never true for an inlined terminal (nothing to externalize), nor for
    /// a `costly` one — `costly` means "always keep the terminal with the
    /// node" (spec.md §4.C) precisely so that decoding this node never has
    /// to fetch and rehash a large externalized value just to confirm its
    /// commitment. Never true when the model forces inlining either.
    pub fn take_terminal_from_value(&self, model: &impl CommitmentModel) -> bool {
        self.terminal
            .as_ref()
            .is_some_and(|t| !t.value_in_commitment && !t.costly && !model.always_store_terminal_with_node())
    }

    /// Encodes this node per spec.md §4.D. `arity` is the trie's fixed
    /// path arity (needed to pack/unpack the path fragment on the wire);
    /// `hash_size` is the model's configured commitment width;
    /// `take_terminal_from_value` is decided by the caller (the updatable
    /// trie), since whether a terminal is externalized depends on model
    /// policy, not on anything recorded in `TCommitment` itself.
    pub fn encode(&self, arity: PathArity, hash_size: HashSize, take_terminal_from_value: bool) -> Vec<u8> {
        let mut out = Vec::new();
        let terminal_exists = self.terminal.is_some();
        let serialize_children = !self.children.is_empty();
        let serialize_path_fragment = !self.path_fragment.is_empty();
        let take_terminal_from_value = terminal_exists && take_terminal_from_value;

        let mut flag_byte = 0u8;
        if terminal_exists {
            flag_byte |= flags::TERMINAL_EXISTS;
        }
        if take_terminal_from_value {
            flag_byte |= flags::TAKE_TERMINAL_FROM_VALUE;
        }
        if serialize_children {
            flag_byte |= flags::SERIALIZE_CHILDREN;
        }
        if serialize_path_fragment {
            flag_byte |= flags::SERIALIZE_PATH_FRAGMENT;
        }
        out.push(flag_byte);

        if serialize_path_fragment {
            crate::path::encode_digits_on_wire(&self.path_fragment, arity, &mut out);
        }

        if terminal_exists && !take_terminal_from_value {
            let terminal = self.terminal.as_ref().expect("terminal_exists checked above");
            encode_terminal(terminal, &mut out);
        }

        if serialize_children {
            let mut bitmap = vec![0u8; BITMAP_BYTES];
            for &digit in self.children.keys() {
                let idx = digit as usize;
                bitmap[idx / 8] |= 1 << (idx % 8);
            }
            out.extend_from_slice(&bitmap);
            for commitment in self.children.values() {
                debug_assert_eq!(commitment.0.len(), hash_size.as_usize());
                out.extend_from_slice(&commitment.0);
            }
        }

        out
    }

    /// Decodes a node record produced by [`NodeData::encode`].
    ///
    /// `fetch_value_terminal` is invoked only when the record declares
    /// `takeTerminalFromValue`, with the just-decoded path fragment (the
    /// caller combines it with the path prefix it already knows from the
    /// ongoing descent to form this node's full trie key, then hashes the
    /// externalized value found there — spec.md §4.D, §4.E). The fragment
    /// is only known partway through decoding, which is why the callback
    /// takes it as a parameter rather than being precomputed by the caller.
    pub fn decode(
        bytes: &[u8],
        arity: PathArity,
        hash_size: HashSize,
        mut fetch_value_terminal: impl FnMut(&[Digit]) -> Option<TCommitment>,
    ) -> Result<NodeData, NodeDecodeError> {
        if bytes.is_empty() {
            return Err(NodeDecodeError::Empty);
        }
        let flag_byte = bytes[0];
        if flag_byte == 0 {
            return Err(NodeDecodeError::ZeroFlags);
        }
        let mut cursor = 1usize;

        let mut path_fragment = Vec::new();
        if flag_byte & flags::SERIALIZE_PATH_FRAGMENT != 0 {
            let remaining = bytes.get(cursor..).ok_or(NodeDecodeError::Truncated("path fragment"))?;
            let (digits, rest) = crate::path::decode_digits_on_wire(remaining, arity)
                .map_err(|_| NodeDecodeError::Truncated("path fragment"))?;
            path_fragment = digits.0;
            cursor = bytes.len() - rest.len();
        }

        let mut terminal = None;
        if flag_byte & flags::TERMINAL_EXISTS != 0 {
            if flag_byte & flags::TAKE_TERMINAL_FROM_VALUE != 0 {
                terminal = fetch_value_terminal(&path_fragment);
            } else {
                let remaining = bytes.get(cursor..).ok_or(NodeDecodeError::Truncated("terminal"))?;
                let (t, consumed) = decode_terminal(remaining)?;
                terminal = Some(t);
                cursor += consumed;
            }
        }

        let mut children = BTreeMap::new();
        if flag_byte & flags::SERIALIZE_CHILDREN != 0 {
            let bitmap = bytes
                .get(cursor..cursor + BITMAP_BYTES)
                .ok_or(NodeDecodeError::Truncated("children bitmap"))?;
            cursor += BITMAP_BYTES;
            for idx in 0..(BITMAP_BYTES * 8) {
                let set = bitmap[idx / 8] & (1 << (idx % 8)) != 0;
                if !set {
                    continue;
                }
                let end = cursor + hash_size.as_usize();
                let raw = bytes.get(cursor..end).ok_or(NodeDecodeError::Truncated("child commitment"))?;
                children.insert(idx as Digit, VCommitment(raw.to_vec()));
                cursor = end;
            }
        }

        if cursor != bytes.len() {
            return Err(NodeDecodeError::TrailingBytes(bytes.len() - cursor));
        }

        Ok(NodeData { path_fragment, children, terminal, commitment: None })
    }
}

/// 1 flag byte (length:6 bits | costly:0x40 | value-in-commitment:0x80) then
/// raw bytes (spec.md §4.C "Terminal encoding").
fn encode_terminal(t: &TCommitment, out: &mut Vec<u8>) {
    let len = t.raw.len() as u8 & 0x3F;
    let mut flag = len;
    if t.costly {
        flag |= 0x40;
    }
    if t.value_in_commitment {
        flag |= 0x80;
    }
    out.push(flag);
    out.extend_from_slice(&t.raw);
}

fn decode_terminal(bytes: &[u8]) -> Result<(TCommitment, usize), NodeDecodeError> {
    let flag = *bytes.first().ok_or(NodeDecodeError::Truncated("terminal flag"))?;
    let len = (flag & 0x3F) as usize;
    if len > 32 {
        return Err(NodeDecodeError::OversizedTerminal(len));
    }
    let costly = flag & 0x40 != 0;
    let value_in_commitment = flag & 0x80 != 0;
    let raw = bytes.get(1..1 + len).ok_or(NodeDecodeError::Truncated("terminal bytes"))?.to_vec();
    Ok((TCommitment { raw, value_in_commitment, costly }, 1 + len))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::commitment::HashSize;

    fn sample_node() -> NodeData {
        let mut n = NodeData::new(vec![1, 2, 3]);
        n.children.insert(0, VCommitment(vec![0xAA; 20]));
        n.children.insert(5, VCommitment(vec![0xBB; 20]));
        n.terminal = Some(TCommitment { raw: b"value".to_vec(), value_in_commitment: true, costly: false });
        n
    }

    #[test]
    fn encode_decode_roundtrip() {
        let n = sample_node();
        let bytes = n.encode(PathArity::Nibble, HashSize::Bits160, false);
        let decoded = NodeData::decode(&bytes, PathArity::Nibble, HashSize::Bits160, |_| None).unwrap();
        assert_eq!(decoded.path_fragment, n.path_fragment);
        assert_eq!(decoded.children, n.children);
        assert_eq!(decoded.terminal, n.terminal);
    }

    #[test]
    fn zero_flags_is_rejected() {
        let err = NodeData::decode(&[0u8], PathArity::Byte, HashSize::Bits160, |_| None).unwrap_err();
        assert!(matches!(err, NodeDecodeError::ZeroFlags));
    }

    #[test]
    fn empty_record_is_rejected() {
        let err = NodeData::decode(&[], PathArity::Byte, HashSize::Bits160, |_| None).unwrap_err();
        assert!(matches!(err, NodeDecodeError::Empty));
    }

    #[test]
    fn take_terminal_from_value_roundtrip() {
        let mut n = NodeData::new(vec![]);
        n.terminal = Some(TCommitment { raw: vec![0xCC; 20], value_in_commitment: false, costly: false });
        let bytes = n.encode(PathArity::Byte, HashSize::Bits160, true);
        let expected = n.terminal.clone();
        let decoded =
            NodeData::decode(&bytes, PathArity::Byte, HashSize::Bits160, |_| expected.clone()).unwrap();
        assert_eq!(decoded.terminal, n.terminal);
    }

    #[test]
    fn trailing_bytes_detected() {
        let n = sample_node();
        let mut bytes = n.encode(PathArity::Nibble, HashSize::Bits160, false);
        bytes.push(0xFF);
        let err = NodeData::decode(&bytes, PathArity::Nibble, HashSize::Bits160, |_| None).unwrap_err();
        assert!(matches!(err, NodeDecodeError::TrailingBytes(1)));
    }
}
