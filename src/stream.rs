// Authenticated radix-trie key/value store.
//
// SPDX-License-Identifier: Apache-2.0

//! KV-stream file format (SPEC_FULL.md component M, spec.md §6): a sequence
//! of `(keyLen:u16, key, valueLen:u32, value)` records, EOF-terminated. This
//! is the one "file-stream utility" the core must expose, since
//! [`crate::reader::TrieReader::snapshot`] needs something to write into; a
//! CLI driver reading/writing these streams from actual files is an external
//! collaborator (spec.md §1 Non-goals).

use std::io::{self, Read, Write};

use crate::kv::KVWriter;

/// Writes one `(key, value)` record to `out` in the KV-stream format.
pub fn write_record(out: &mut impl Write, key: &[u8], value: &[u8]) -> io::Result<()> {
    out.write_all(&(key.len() as u16).to_le_bytes())?;
    out.write_all(key)?;
    out.write_all(&(value.len() as u32).to_le_bytes())?;
    out.write_all(value)?;
    Ok(())
}

/// Reads one `(key, value)` record from `input`. Returns `Ok(None)` on a
/// clean EOF before any bytes of a new record are read; any other I/O
/// failure, including a truncated record, is propagated as `Err`.
pub fn read_record(input: &mut impl Read) -> io::Result<Option<(Vec<u8>, Vec<u8>)>> {
    let mut key_len_buf = [0u8; 2];
    match read_exact_or_eof(input, &mut key_len_buf)? {
        false => return Ok(None),
        true => {}
    }
    let key_len = u16::from_le_bytes(key_len_buf) as usize;
    let mut key = vec![0u8; key_len];
    input.read_exact(&mut key)?;

    let mut value_len_buf = [0u8; 4];
    input.read_exact(&mut value_len_buf)?;
    let value_len = u32::from_le_bytes(value_len_buf) as usize;
    let mut value = vec![0u8; value_len];
    input.read_exact(&mut value)?;

    Ok(Some((key, value)))
}

/// Like `Read::read_exact`, but reports a zero-byte read as a clean `Ok(false)`
/// rather than an `UnexpectedEof` error, so callers can distinguish "no more
/// records" from "a record was cut short".
fn read_exact_or_eof(input: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Writes every `(key, value)` pair yielded by `entries` as a KV stream.
pub fn write_kv_stream<'a>(
    out: &mut impl Write,
    entries: impl IntoIterator<Item = (&'a [u8], &'a [u8])>,
) -> io::Result<()> {
    for (k, v) in entries {
        write_record(out, k, v)?;
    }
    Ok(())
}

/// Reads an entire KV stream, applying each record to `dest` via
/// [`KVWriter::set`].
pub fn read_kv_stream(input: &mut impl Read, dest: &mut impl KVWriter) -> io::Result<usize> {
    let mut count = 0;
    while let Some((key, value)) = read_record(input)? {
        dest.set(&key, &value);
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::kv::{KVReader, MemoryStore};

    #[test]
    fn single_record_roundtrip() {
        let mut buf = Vec::new();
        write_record(&mut buf, b"key", b"value").unwrap();
        let mut cursor = &buf[..];
        let (k, v) = read_record(&mut cursor).unwrap().unwrap();
        assert_eq!(k, b"key");
        assert_eq!(v, b"value");
        assert!(read_record(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn empty_stream_yields_no_records() {
        let buf: Vec<u8> = Vec::new();
        let mut cursor = &buf[..];
        assert!(read_record(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn stream_roundtrips_into_a_store() {
        let mut buf = Vec::new();
        let entries: Vec<(&[u8], &[u8])> = vec![(b"a", b"1"), (b"b", b"2"), (b"c", b"3")];
        write_kv_stream(&mut buf, entries.clone()).unwrap();

        let mut store = MemoryStore::new();
        let mut cursor = &buf[..];
        let count = read_kv_stream(&mut cursor, &mut store).unwrap();
        assert_eq!(count, 3);
        for (k, v) in entries {
            assert_eq!(store.get(k), Some(v.to_vec()));
        }
    }

    #[test]
    fn truncated_record_is_an_error() {
        let mut buf = Vec::new();
        write_record(&mut buf, b"key", b"value").unwrap();
        buf.truncate(buf.len() - 2);
        let mut cursor = &buf[..];
        assert!(read_record(&mut cursor).is_err());
    }
}
