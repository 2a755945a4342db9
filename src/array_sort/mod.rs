//! Array sort (AS, design spec §4.2): sorts an in-memory run of records,
//! represented as a permutation of indices into parallel `keys`/`hashes`
//! slices rather than moving whole records — the indirection the teacher
//! codebase uses to keep comparisons cheap when the payload per key is
//! large.
//!
//! Dispatch between the four variants follows the spec's own decision
//! tree: quicksort when there is no monotone hash, the array is too small
//! for radix to pay off, or the remaining hash width has been exhausted;
//! radix otherwise; and within either family, the parallel variant once
//! both a worker pool is available and the array clears
//! `thread_threshold_bytes`.

mod parallel;
mod quicksort;
mod radix;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use crate::adapter::SortAdapter;
use crate::config::Config;
use crate::worker_pool::WorkerPool;

/// Sorts `indices` (expected to be `0..keys.len()` in some order) so that
/// `adapter.compare(&keys[indices[i]], &keys[indices[i+1]])` is never
/// `Greater`.
///
/// Ordering comes from `adapter`'s own comparator, not `K`'s `Ord` impl —
/// an adapter may override `compare()` (reverse order, numeric collation,
/// locale-aware string order) independently of whatever `Ord` `K` happens
/// to implement, and every variant dispatched here must honor that
/// override the same way external merge already does via
/// `adapter.compare()`.
///
/// `hashes`, when present, must be a monotone hash parallel to `keys` with
/// respect to `adapter.compare()` (design spec §3: `compare(k1, k2) !=
/// Greater => h(k1) <= h(k2)`) with `hash_bits` bits of useful width;
/// passing `None` forces the quicksort-only path.
#[allow(clippy::too_many_arguments)]
pub fn sort_indices<K: Sync + 'static, A: SortAdapter<K> + 'static>(
    indices: &mut [usize],
    keys: &[K],
    hashes: Option<&[u64]>,
    hash_bits: u32,
    elt_size: usize,
    cfg: &Config,
    pool: Option<&Arc<WorkerPool>>,
    adapter: &A,
) {
    let n = indices.len();
    if n <= 1 {
        return;
    }
    let bytes = n.saturating_mul(elt_size.max(1));

    let use_radix = hashes.is_some() && hash_bits > cfg.min_radix_bits && bytes >= cfg.radix_threshold_bytes;
    let use_parallel = bytes >= cfg.thread_threshold_bytes && pool.is_some() && cfg.worker_threads > 0;

    if !use_radix {
        match (use_parallel, pool) {
            (true, Some(pool)) => parallel::parallel_quicksort(indices, keys, cfg, pool, adapter),
            _ => quicksort::sort(indices, keys, adapter),
        }
        return;
    }

    let hashes = hashes.expect("use_radix implies hashes.is_some()");
    match (use_parallel, pool) {
        (true, Some(pool)) => {
            let mut aux = vec![0usize; n];
            parallel::parallel_radix_sort(indices, &mut aux, keys, hashes, hash_bits, cfg, pool, adapter);
        }
        _ => {
            let mut aux = vec![0usize; n];
            radix::sort(indices, &mut aux, keys, hashes, hash_bits, cfg, adapter);
        }
    }
}
