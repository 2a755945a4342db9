//! External merge (EM, design spec §4.5): two-way and k-way merge of the
//! sorted runs living inside one bucket. Runs are physically concatenated
//! within a single stream with no boundary marker; both merge variants
//! recover run boundaries by watching for a key that is not greater than
//! the one emitted just before it, the same trick `fcoreutils`'s
//! `merge_sorted` relies on to fold multiple `-m`-style pre-sorted inputs
//! without a length prefix.
//!
//! Every run's current head record is fully materialized in memory before
//! comparison (via `fetch_record`), so both merge variants select the
//! overall minimum with a linear scan across run cursors rather than a
//! `BinaryHeap`: a heap needs its element type to implement `Ord`, but the
//! adapter's comparator is supplied at runtime, not encoded in `K`'s own
//! `Ord` impl, so the heap's ordering can't be expressed without an extra
//! wrapper type. Fan-in is bounded by `max_multiway_bits` (at most a few
//! dozen runs), so the scan stays cheap. Because every head is already
//! in memory, run collapsing during merge always goes through
//! `SortAdapter::merge`, never `merge_streaming`.

use std::cmp::Ordering;
use std::io::{Seek, SeekFrom};

use crate::adapter::SortAdapter;
use crate::bucket::Bucket;
use crate::error::SortResult;

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOutcome {
    pub runs_produced: u32,
    pub records_written: u64,
    pub records_unified: u64,
}

/// Merges every run in `src` into a single sorted run written to `dst`.
pub fn k_way_merge<K, A>(adapter: &A, src: &mut Bucket, dst: &mut Bucket) -> SortResult<MergeOutcome>
where
    K: Ord + Clone + Send + 'static,
    A: SortAdapter<K>,
{
    let ranges = discover_run_ranges(adapter, src)?;
    let mut cursors: Vec<RunCursor<K>> = ranges.into_iter().map(|(s, e)| RunCursor::new(s, e)).collect();
    merge_cursors(adapter, &mut cursors, src, dst)
}

/// One balanced two-way merge pass: pairs up consecutive runs in `src` and
/// merges each pair into one run, writing the result alternately to
/// `out_a` and `out_b` so a subsequent pass can read both independently
/// (design spec §4.5, "alternating output buckets"). An odd run out is
/// copied through unmerged (as a trivial one-cursor "merge"). Returns the
/// number of runs written to each output bucket.
pub fn two_way_merge_pass<K, A>(
    adapter: &A,
    src: &mut Bucket,
    out_a: &mut Bucket,
    out_b: &mut Bucket,
) -> SortResult<(u32, u32)>
where
    K: Ord + Clone + Send + 'static,
    A: SortAdapter<K>,
{
    let ranges = discover_run_ranges(adapter, src)?;
    let mut runs_to_a = 0u32;
    let mut runs_to_b = 0u32;
    let mut use_a = true;
    let mut i = 0;
    while i < ranges.len() {
        let pair_end = (i + 2).min(ranges.len());
        let mut cursors: Vec<RunCursor<K>> = ranges[i..pair_end]
            .iter()
            .map(|&(s, e)| RunCursor::new(s, e))
            .collect();
        if use_a {
            merge_cursors(adapter, &mut cursors, src, out_a)?;
            runs_to_a += 1;
        } else {
            merge_cursors(adapter, &mut cursors, src, out_b)?;
            runs_to_b += 1;
        }
        use_a = !use_a;
        i = pair_end;
    }
    Ok((runs_to_a, runs_to_b))
}

/// A read cursor over one run's `[start, end)` byte range within a shared
/// bucket. Since several cursors take turns reading from the same
/// underlying stream, each seeks to its own resume point before every
/// read rather than assuming the stream is still positioned where it left
/// off.
struct RunCursor<K> {
    end: u64,
    pos: u64,
    head: Option<(K, Vec<u8>)>,
}

impl<K: Ord> RunCursor<K> {
    fn new(start: u64, end: u64) -> Self {
        RunCursor { end, pos: start, head: None }
    }

    fn ensure_head<A: SortAdapter<K>>(&mut self, adapter: &A, bucket: &mut Bucket) -> SortResult<()>
    where
        K: Clone + Send + 'static,
    {
        if self.head.is_some() || self.pos >= self.end {
            return Ok(());
        }
        bucket.seek(SeekFrom::Start(self.pos))?;
        match adapter.read_key(bucket)? {
            Some(key) => {
                let tail = adapter
                    .fetch_record(bucket, &key, usize::MAX)?
                    .expect("fetch_record with usize::MAX limit must always succeed");
                self.pos = bucket.stream_position()?;
                self.head = Some((key, tail));
            }
            None => {
                self.pos = self.end;
            }
        }
        Ok(())
    }

    fn peek_key(&self) -> Option<&K> {
        self.head.as_ref().map(|(k, _)| k)
    }

    fn take(&mut self) -> (K, Vec<u8>) {
        self.head.take().expect("take() called without ensure_head")
    }
}

fn merge_cursors<K, A>(
    adapter: &A,
    cursors: &mut [RunCursor<K>],
    src: &mut Bucket,
    dst: &mut Bucket,
) -> SortResult<MergeOutcome>
where
    K: Ord + Clone + Send + 'static,
    A: SortAdapter<K>,
{
    let mut outcome = MergeOutcome::default();
    for cursor in cursors.iter_mut() {
        cursor.ensure_head(adapter, src)?;
    }

    let unify = adapter.unify();
    let mut pending: Option<(K, Vec<u8>)> = None;
    loop {
        let min_idx = cursors
            .iter()
            .enumerate()
            .filter(|(_, c)| c.peek_key().is_some())
            .min_by(|(_, a), (_, b)| adapter.compare(a.peek_key().unwrap(), b.peek_key().unwrap()))
            .map(|(i, _)| i);
        let Some(min_idx) = min_idx else {
            break;
        };
        let (key, tail) = cursors[min_idx].take();
        cursors[min_idx].ensure_head(adapter, src)?;

        pending = match pending.take() {
            None => Some((key, tail)),
            Some((pk, pt)) => {
                if unify && adapter.compare(&pk, &key) == Ordering::Equal {
                    match adapter.merge((&pk, &pt), (&key, &tail)) {
                        Some(merged) => Some(merged),
                        None => {
                            outcome.records_unified += 2;
                            None
                        }
                    }
                } else {
                    adapter.store_record(dst, &pk, &pt)?;
                    outcome.records_written += 1;
                    Some((key, tail))
                }
            }
        };
    }
    if let Some((k, t)) = pending {
        adapter.store_record(dst, &k, &t)?;
        outcome.records_written += 1;
    }

    dst.add_run();
    outcome.runs_produced = 1;
    Ok(outcome)
}

/// Scans `src` from the start once, noting every offset where a run
/// begins: offset 0 and every position where the key just read compares
/// less than the previous key emitted.
fn discover_run_ranges<K, A>(adapter: &A, src: &mut Bucket) -> SortResult<Vec<(u64, u64)>>
where
    K: Ord + Clone + Send + 'static,
    A: SortAdapter<K>,
{
    src.seek(SeekFrom::Start(0))?;
    let mut starts = vec![0u64];
    let mut last_key: Option<K> = None;
    loop {
        let pos = src.stream_position()?;
        let Some(key) = adapter.read_key(src)? else {
            break;
        };
        if let Some(prev) = &last_key {
            if adapter.compare(prev, &key) == Ordering::Greater {
                starts.push(pos);
            }
        }
        let _ = adapter.fetch_record(src, &key, usize::MAX)?;
        last_key = Some(key);
    }
    let total_len = src.filesize()?;
    let ranges = starts
        .iter()
        .enumerate()
        .map(|(i, &s)| (s, starts.get(i + 1).copied().unwrap_or(total_len)))
        .collect();
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::BucketStore;
    use std::io::{Read, Write};

    struct LineAdapter;

    impl SortAdapter<u32> for LineAdapter {
        fn read_key(&self, src: &mut dyn crate::stream::Stream) -> SortResult<Option<u32>> {
            let mut buf = [0u8; 16];
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

        fn write_record(
            &self,
            _src: &mut dyn crate::stream::Stream,
            dst: &mut dyn crate::stream::Stream,
            key: &u32,
        ) -> SortResult<()> {
            writeln!(dst, "{key}")?;
            Ok(())
        }

        fn fetch_record(
            &self,
            _src: &mut dyn crate::stream::Stream,
            _key: &u32,
            _limit: usize,
        ) -> SortResult<Option<Vec<u8>>> {
            Ok(Some(Vec::new()))
        }

        fn store_record(&self, dst: &mut dyn crate::stream::Stream, key: &u32, _tail: &[u8]) -> SortResult<()> {
            writeln!(dst, "{key}")?;
            Ok(())
        }
    }

    fn parse(bytes: &[u8]) -> u32 {
        std::str::from_utf8(bytes).unwrap().parse().unwrap()
    }

    fn write_run(bucket: &mut Bucket, values: &[u32]) {
        for v in values {
            writeln!(bucket, "{v}").unwrap();
        }
    }

    #[test]
    fn k_way_merge_of_three_runs_produces_sorted_output() {
        let adapter = LineAdapter;
        let dir = tempfile::tempdir().unwrap();
        let mut store = BucketStore::new(Some(dir.path().to_path_buf()), 4096, 16);
        let src_id = store.new_bucket(0);
        {
            let src = store.open_write(src_id).unwrap();
            write_run(src, &[1, 4, 9]);
            write_run(src, &[2, 3]);
            write_run(src, &[0, 5, 8]);
        }
        let dst_id = store.new_bucket(0);

        store.open_read(src_id).unwrap();
        store.open_write(dst_id).unwrap();
        let mut pair = store.checkout_many(&[src_id, dst_id]);
        let (mut dst, mut src) = (pair.pop().unwrap(), pair.pop().unwrap());
        let outcome = k_way_merge(&adapter, &mut src, &mut dst).unwrap();
        assert_eq!(outcome.records_written, 8);
        store.return_many(&[src_id, dst_id], vec![src, dst]);

        let dst = store.open_read(dst_id).unwrap();
        let mut out = String::new();
        dst.read_to_string(&mut out).unwrap();
        assert_eq!(out, "0\n1\n2\n3\n4\n5\n8\n9\n");
    }

    #[test]
    fn two_way_pass_halves_run_count() {
        let adapter = LineAdapter;
        let dir = tempfile::tempdir().unwrap();
        let mut store = BucketStore::new(Some(dir.path().to_path_buf()), 4096, 16);
        let src_id = store.new_bucket(0);
        {
            let src = store.open_write(src_id).unwrap();
            write_run(src, &[5, 6]);
            write_run(src, &[1, 2]);
            write_run(src, &[3, 9]);
            write_run(src, &[0, 4]);
        }
        let a_id = store.new_bucket(0);
        let b_id = store.new_bucket(0);

        store.open_read(src_id).unwrap();
        store.open_write(a_id).unwrap();
        store.open_write(b_id).unwrap();
        let mut triple = store.checkout_many(&[src_id, a_id, b_id]);
        let (mut b, mut a, mut src) = (triple.pop().unwrap(), triple.pop().unwrap(), triple.pop().unwrap());
        let (to_a, to_b) = two_way_merge_pass(&adapter, &mut src, &mut a, &mut b).unwrap();
        assert_eq!((to_a, to_b), (1, 1));
        store.return_many(&[src_id, a_id, b_id], vec![src, a, b]);

        let a = store.open_read(a_id).unwrap();
        let mut out_a = String::new();
        a.read_to_string(&mut out_a).unwrap();
        assert_eq!(out_a, "1\n2\n5\n6\n");

        let b = store.open_read(b_id).unwrap();
        let mut out_b = String::new();
        b.read_to_string(&mut out_b).unwrap();
        assert_eq!(out_b, "0\n3\n4\n9\n");
    }
}
