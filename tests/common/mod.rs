//! Shared fixtures for the black-box property tests in `tests/`. Not a
//! test binary itself (Cargo only auto-discovers top-level files under
//! `tests/`), just a `mod` the scenario files pull in.
//!
//! Each scenario file only uses a subset of what's here, and `mod common;`
//! is recompiled fresh per test binary, so `dead_code` is blanket-allowed
//! rather than threading `#[allow]` onto every unused-elsewhere item.
#![allow(dead_code)]

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use xmsort::adapter::SortAdapter;
use xmsort::config::Config;
use xmsort::error::SortResult;
use xmsort::scheduler::SortOutcome;
use xmsort::stream::{MemStream, Stream};

/// `sort` takes its output stream by value, so callers that need the
/// bytes back afterwards share a cursor through an `Arc<Mutex<_>>` rather
/// than handing in a plain `Cursor<Vec<u8>>`.
#[derive(Clone)]
struct SharedBuf(Arc<Mutex<Cursor<Vec<u8>>>>);

impl SharedBuf {
    fn new() -> Self {
        SharedBuf(Arc::new(Mutex::new(Cursor::new(Vec::new()))))
    }

    fn into_bytes(self) -> Vec<u8> {
        Arc::try_unwrap(self.0)
            .expect("sort() drops its output bucket before returning")
            .into_inner()
            .unwrap()
            .into_inner()
    }
}

impl Read for SharedBuf {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.lock().unwrap().read(buf)
    }
}
impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().unwrap().flush()
    }
}
impl Seek for SharedBuf {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.lock().unwrap().seek(pos)
    }
}

/// Runs `xmsort::sort` entirely in memory and hands back the raw output
/// bytes plus the outcome counters, so each scenario file only has to
/// decode its own record shape.
pub fn run_sort<K, A>(adapter: &A, input: Vec<u8>, cfg: &Config) -> (Vec<u8>, SortOutcome)
where
    K: Ord + Clone + Send + Sync + 'static,
    A: SortAdapter<K>,
{
    let input: Box<dyn Stream> = Box::new(MemStream::new(input));
    let output = SharedBuf::new();
    let hash_bits_hint = adapter.hash_bits();
    let outcome = xmsort::sort(adapter, input, Box::new(output.clone()), hash_bits_hint, cfg).unwrap();
    (output.into_bytes(), outcome)
}

/// Newline-delimited decimal `u64` keys, no payload — used by the
/// Increasing/Decreasing/Pseudo-random/determinism/idempotence scenarios.
pub struct U64LineAdapter {
    pub unify: bool,
}

impl SortAdapter<u64> for U64LineAdapter {
    fn read_key(&self, src: &mut dyn Stream) -> SortResult<Option<u64>> {
        let mut buf = [0u8; 24];
        let mut n = 0;
        loop {
            let mut byte = [0u8; 1];
            let r = src.read(&mut byte)?;
            if r == 0 {
                return Ok(if n == 0 { None } else { Some(parse(&buf[..n])) });
            }
            if byte[0] == b'\n' {
                return Ok(Some(parse(&buf[..n])));
            }
            buf[n] = byte[0];
            n += 1;
        }
    }

    fn write_record(&self, _src: &mut dyn Stream, dst: &mut dyn Stream, key: &u64) -> SortResult<()> {
        writeln!(dst, "{key}")?;
        Ok(())
    }

    fn fetch_record(&self, _src: &mut dyn Stream, _key: &u64, limit: usize) -> SortResult<Option<Vec<u8>>> {
        if limit < 8 {
            return Ok(None);
        }
        Ok(Some(Vec::new()))
    }

    fn store_record(&self, dst: &mut dyn Stream, key: &u64, _tail: &[u8]) -> SortResult<()> {
        writeln!(dst, "{key}")?;
        Ok(())
    }

    fn unify(&self) -> bool {
        self.unify
    }

    fn merge(&self, a: (&u64, &[u8]), _b: (&u64, &[u8])) -> Option<(u64, Vec<u8>)> {
        Some((*a.0, Vec::new()))
    }

    fn hash(&self, key: &u64) -> Option<u64> {
        Some(*key)
    }

    fn hash_bits(&self) -> u32 {
        64
    }
}

fn parse(bytes: &[u8]) -> u64 {
    std::str::from_utf8(bytes).unwrap().parse().unwrap()
}

pub fn decode_u64_lines(bytes: &[u8]) -> Vec<u64> {
    std::str::from_utf8(bytes)
        .unwrap()
        .lines()
        .map(|l| l.parse().unwrap())
        .collect()
}

/// Fixed-width binary records: a 4-byte big-endian key followed by a
/// 12-byte payload, used by the Hashes scenario. The key *is* the sort
/// key, so `hash(k) == k as u64` is trivially monotone with `Ord`.
pub struct FixedWidthAdapter;

impl SortAdapter<u32> for FixedWidthAdapter {
    fn read_key(&self, src: &mut dyn Stream) -> SortResult<Option<u32>> {
        let mut buf = [0u8; 4];
        match src.read_exact(&mut buf) {
            Ok(()) => Ok(Some(u32::from_be_bytes(buf))),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_record(&self, src: &mut dyn Stream, dst: &mut dyn Stream, key: &u32) -> SortResult<()> {
        let mut payload = [0u8; 12];
        src.read_exact(&mut payload)?;
        dst.write_all(&key.to_be_bytes())?;
        dst.write_all(&payload)?;
        Ok(())
    }

    fn fetch_record(&self, src: &mut dyn Stream, _key: &u32, limit: usize) -> SortResult<Option<Vec<u8>>> {
        if limit < 16 {
            return Ok(None);
        }
        let mut payload = vec![0u8; 12];
        src.read_exact(&mut payload)?;
        Ok(Some(payload))
    }

    fn store_record(&self, dst: &mut dyn Stream, key: &u32, tail: &[u8]) -> SortResult<()> {
        dst.write_all(&key.to_be_bytes())?;
        dst.write_all(tail)?;
        Ok(())
    }

    fn hash(&self, key: &u32) -> Option<u64> {
        Some(*key as u64)
    }

    fn hash_bits(&self) -> u32 {
        32
    }

    fn record_size(&self, _key: &u32, _tail: &[u8]) -> usize {
        16
    }
}

/// Deterministic 16-byte scrambler standing in for the original scenario's
/// MD5 digest (this lineage carries no hashing crate, see DESIGN.md): a
/// few SplitMix64 rounds keyed on the record index, wide enough that the
/// leading 4 bytes behave like an unrelated hash of `i` for test purposes.
pub fn scramble(i: u32) -> [u8; 16] {
    let mut x = i as u64 ^ 0x9E3779B97F4A7C15;
    let mut out = [0u8; 16];
    for chunk in out.chunks_mut(8) {
        x ^= x >> 30;
        x = x.wrapping_mul(0xBF58476D1CE4E5B9);
        x ^= x >> 27;
        x = x.wrapping_mul(0x94D049BB133111EB);
        x ^= x >> 31;
        chunk.copy_from_slice(&x.to_be_bytes());
    }
    out
}

/// Length-prefixed byte strings (length byte 0..255 followed by that many
/// bytes) used by the Variable-length-strings and Unification-on-strings
/// scenarios. The key is the whole string, so the adapter exercises AS's
/// quicksort path (no hash) rather than radix.
pub struct VarLenStringAdapter {
    pub unify: bool,
}

impl SortAdapter<Vec<u8>> for VarLenStringAdapter {
    fn read_key(&self, src: &mut dyn Stream) -> SortResult<Option<Vec<u8>>> {
        let mut len_byte = [0u8; 1];
        match src.read(&mut len_byte)? {
            0 => Ok(None),
            _ => {
                let mut buf = vec![0u8; len_byte[0] as usize];
                src.read_exact(&mut buf)?;
                Ok(Some(buf))
            }
        }
    }

    fn write_record(&self, _src: &mut dyn Stream, dst: &mut dyn Stream, key: &Vec<u8>) -> SortResult<()> {
        dst.write_all(&[key.len() as u8])?;
        dst.write_all(key)?;
        Ok(())
    }

    fn fetch_record(&self, _src: &mut dyn Stream, _key: &Vec<u8>, _limit: usize) -> SortResult<Option<Vec<u8>>> {
        Ok(Some(Vec::new()))
    }

    fn store_record(&self, dst: &mut dyn Stream, key: &Vec<u8>, _tail: &[u8]) -> SortResult<()> {
        dst.write_all(&[key.len() as u8])?;
        dst.write_all(key)?;
        Ok(())
    }

    fn unify(&self) -> bool {
        self.unify
    }

    fn merge(&self, a: (&Vec<u8>, &[u8]), _b: (&Vec<u8>, &[u8])) -> Option<(Vec<u8>, Vec<u8>)> {
        Some((a.0.clone(), Vec::new()))
    }
}

pub fn decode_varlen_strings(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let len = bytes[i] as usize;
        i += 1;
        out.push(bytes[i..i + len].to_vec());
        i += len;
    }
    out
}
