// Authenticated radix-trie key/value store.
//
// SPDX-License-Identifier: Apache-2.0

//! Crate-wide error types.
//!
//! Modeled on `commit_verify`'s doc-comment-driven error enums: each variant
//! carries its own `Display` message as a doc comment and is wired up with
//! `amplify`'s `Display`/`Error`/`From` derives rather than a generic error
//! framework.

use crate::path::MalformedDigits;

/// errors raised while traversing or mutating a trie.
#[derive(Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum TrieError {
    /// key could not be unpacked into trie digits: {0}
    #[from]
    MalformedKey(MalformedDigits),

    /// trie store is corrupt: {0}.
    CorruptStore(String),

    /// root commitment {0:x?} has no corresponding node in the store.
    RootNotFound(Vec<u8>),

    /// root identity must be a non-empty byte string.
    EmptyIdentity,

    /// internal invariant violated: {0}.
    ///
    /// This is a bug in the trie engine, not a consequence of malformed
    /// caller input; it is kept as a distinct variant so callers can tell
    /// the two apart.
    Internal(String),
}

/// errors raised while decoding a Merkle proof or verifying it against a root.
#[derive(Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum ProofError {
    /// proof path is truncated or empty where a step was expected.
    TruncatedPath,

    /// proof element claims child index {0} which is not a valid slot for
    /// the configured arity.
    InvalidChildIndex(u16),

    /// proof element's children map unexpectedly contains the slot that
    /// should have been omitted (index {0}).
    UnexpectedChildCommitment(u16),

    /// a commitment in the proof is {0} bytes long, exceeding the configured
    /// hash size of {1} bytes.
    OversizedCommitment(usize, usize),

    /// a path element claims more children than the 32-byte bitmap can
    /// address.
    TooManyChildren,

    /// recomputed root commitment does not match the commitment supplied by
    /// the caller.
    RootMismatch,

    /// key does not start with the path fragment recorded at proof depth
    /// {0}.
    KeyFragmentMismatch(usize),

    /// key's digit at proof depth {0} does not match the child index the
    /// proof element descends into.
    DescentDigitMismatch(usize),

    /// terminal recorded in the proof does not match the expected terminal
    /// commitment for the supplied value.
    TerminalMismatch,

    /// decoder has trailing data after a well-formed proof.
    NotAllBytesConsumed,

    /// malformed digit sequence inside the proof: {0}
    #[from]
    MalformedKey(MalformedDigits),
}
