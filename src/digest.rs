// Authenticated radix-trie key/value store.
//
// SPDX-License-Identifier: Apache-2.0

//! Tagged hashing helper, modeled directly on `commit_verify::digest`'s
//! `DigestExt` trait. The teacher generalizes over SHA-256 (32-byte,
//! fixed-size) and RIPEMD-160 (20-byte, fixed-size) digest engines; here the
//! same "domain-tag, then feed fixed-width fields" pattern is applied to a
//! single hash family (Blake2b) whose output width is configurable at
//! runtime rather than encoded in the type, since spec.md 4.C requires both
//! a 160-bit and a 256-bit variant of the *same* algorithm.

use crate::commitment::HashSize;

/// A Blake2b hashing engine pre-tagged for domain separation and configured
/// to the trie's hash size.
pub struct TrieHasher {
    state: blake2b_simd::State,
    hash_size: HashSize,
}

impl TrieHasher {
    /// Starts a fresh engine tagged with `tag`, double-hashed the way
    /// `commit_verify`'s `from_tag` constructs its tagged engines (hash the
    /// tag, then seed the real engine with that hash fed in twice) to avoid
    /// length-extension-style collisions between differently tagged domains.
    pub fn from_tag(tag: &[u8], hash_size: HashSize) -> Self {
        let tag_hash = blake2b_simd::Params::new()
            .hash_length(hash_size.as_usize())
            .to_state()
            .update(tag)
            .finalize();

        let mut state = blake2b_simd::Params::new().hash_length(hash_size.as_usize()).to_state();
        state.update(tag_hash.as_bytes());
        state.update(tag_hash.as_bytes());
        TrieHasher { state, hash_size }
    }

    /// Feeds raw bytes into the engine with no length framing.
    pub fn input_raw(&mut self, data: &[u8]) -> &mut Self {
        self.state.update(data);
        self
    }

    /// Consumes the engine, producing `hash_size` bytes of digest.
    pub fn finish(self) -> Vec<u8> {
        self.state.finalize().as_bytes()[..self.hash_size.as_usize()].to_vec()
    }
}

/// One-shot hash of `data` at the given size, untagged.
pub fn hash_bytes(data: &[u8], hash_size: HashSize) -> Vec<u8> {
    blake2b_simd::Params::new()
        .hash_length(hash_size.as_usize())
        .to_state()
        .update(data)
        .finalize()
        .as_bytes()[..hash_size.as_usize()]
        .to_vec()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hash_bytes_respects_size() {
        assert_eq!(hash_bytes(b"hello", HashSize::Bits160).len(), 20);
        assert_eq!(hash_bytes(b"hello", HashSize::Bits256).len(), 32);
    }

    #[test]
    fn hash_bytes_is_deterministic() {
        assert_eq!(
            hash_bytes(b"same input", HashSize::Bits256),
            hash_bytes(b"same input", HashSize::Bits256)
        );
    }

    #[test]
    fn different_tags_produce_different_engines() {
        let mut a = TrieHasher::from_tag(b"tag-a", HashSize::Bits256);
        let mut b = TrieHasher::from_tag(b"tag-b", HashSize::Bits256);
        a.input_raw(b"same payload");
        b.input_raw(b"same payload");
        assert_ne!(a.finish(), b.finish());
    }
}
