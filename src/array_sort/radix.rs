//! Sequential radix sort over index permutations (design spec §4.2.2),
//! driven by the adapter's monotone hash. Each pass buckets on the top
//! `radix_bits` of the remaining hash width, then recurses into every
//! non-trivial bucket with the width reduced accordingly; once the hash
//! runs out, [`super::quicksort`] finishes the bucket using the same
//! adapter radix itself never needs for comparisons (bucketing here is
//! driven entirely by the hash, not by key order).
//!
//! Buffers alternate rather than copy at every level: `radix_pass` takes
//! the array to sort and an equal-length scratch array, and a
//! caller-chosen `want_a` flag saying which of the two should hold the
//! final order — only base cases whose natural landing buffer disagrees
//! with `want_a` pay a copy, not every level of the recursion.

use crate::adapter::SortAdapter;
use crate::config::Config;

use super::quicksort;

pub fn sort<K, A: SortAdapter<K>>(
    indices: &mut [usize],
    aux: &mut [usize],
    keys: &[K],
    hashes: &[u64],
    hash_bits: u32,
    cfg: &Config,
    adapter: &A,
) {
    radix_pass(indices, aux, keys, hashes, hash_bits, cfg, true, adapter);
}

/// Sorts the multiset currently held in `a` (indices into `keys`/`hashes`),
/// using `b` as scratch of the same length. On return, the sorted order is
/// in `a` if `want_a`, else in `b`.
#[allow(clippy::too_many_arguments)]
fn radix_pass<K, A: SortAdapter<K>>(
    a: &mut [usize],
    b: &mut [usize],
    keys: &[K],
    hashes: &[u64],
    hash_bits: u32,
    cfg: &Config,
    want_a: bool,
    adapter: &A,
) {
    let n = a.len();
    if n <= 1 {
        if !want_a {
            b.copy_from_slice(a);
        }
        return;
    }
    if hash_bits == 0 {
        quicksort::sort(a, keys, adapter);
        if !want_a {
            b.copy_from_slice(a);
        }
        return;
    }

    let bits = cfg.radix_bits.min(hash_bits).max(1);
    let shift = hash_bits - bits;
    let mask = (1u64 << bits) - 1;
    let num_buckets = 1usize << bits;

    // Counting pass: bucket boundaries via a prefix sum over per-bucket counts.
    let mut starts = vec![0usize; num_buckets + 1];
    for &idx in a.iter() {
        let bucket = ((hashes[idx] >> shift) & mask) as usize;
        starts[bucket + 1] += 1;
    }
    for i in 0..num_buckets {
        starts[i + 1] += starts[i];
    }
    let bucket_starts = starts.clone();
    let mut cursors = starts;

    // Place pass: stable relative to bucket, writing a -> b.
    for &idx in a.iter() {
        let bucket = ((hashes[idx] >> shift) & mask) as usize;
        b[cursors[bucket]] = idx;
        cursors[bucket] += 1;
    }

    for bucket in 0..num_buckets {
        let lo = bucket_starts[bucket];
        let hi = bucket_starts[bucket + 1];
        if hi - lo <= 1 {
            continue;
        }
        // This bucket's data currently lives in b[lo..hi]; a[lo..hi] is
        // free to reuse as scratch. The desired landing buffer flips at
        // every level so that, averaged over the recursion, only
        // mismatched leaves pay a copy.
        radix_pass(
            &mut b[lo..hi],
            &mut a[lo..hi],
            keys,
            hashes,
            shift,
            cfg,
            !want_a,
            adapter,
        );
    }
}
