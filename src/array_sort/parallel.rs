//! Parallel array-sort variants (design spec §4.2, parallel radix and
//! parallel quicksort), dispatched once the array is large enough to
//! amortize worker-pool submission overhead (`thread_threshold_bytes`).
//!
//! Parallel radix follows the spec's phase A/B/C shape: phase A buckets
//! disjoint slabs of the input concurrently into per-slab counts (no
//! shared mutable state between workers), phase B prefix-sums the
//! per-slab counts into global bucket offsets on the submitting thread
//! (cheap, O(buckets * slabs)), and phase C re-reads the same disjoint
//! slabs concurrently, each worker writing only into the global bucket
//! ranges its slab owns — the "disjoint-write invariant" that makes phase
//! C safe without locks. Bucketing is driven entirely by the hash, so no
//! comparator is needed until the final sequential per-bucket recursion.
//!
//! Parallel quicksort instead partitions the range in place (the same
//! median-of-three Hoare partition [`super::quicksort`] uses) and
//! publishes the left and right partitions as work-pool tasks once the
//! recursion passes below a size that no longer justifies submission
//! overhead, falling back to [`super::quicksort`] inline. Ordering
//! throughout comes from the adapter's own `compare()`, not `K: Ord`,
//! since an adapter may override `compare()` independently of whatever
//! `Ord` impl `K` has.

use std::sync::{Arc, Mutex};

use crate::adapter::SortAdapter;
use crate::config::Config;
use crate::worker_pool::WorkerPool;

use super::{quicksort, radix};

/// Splits `n` items across `pool`'s thread count into roughly
/// `thread_chunk_bytes`-sized slabs, never fewer than 1 nor more slabs
/// than threads can usefully run at once.
fn slab_bounds(n: usize, elt_size: usize, cfg: &Config, threads: usize) -> Vec<(usize, usize)> {
    let per_slab = (cfg.thread_chunk_bytes / elt_size.max(1)).max(1);
    let slab_count = (n.div_ceil(per_slab)).clamp(1, threads.max(1) * 4);
    let base = n / slab_count;
    let rem = n % slab_count;
    let mut bounds = Vec::with_capacity(slab_count);
    let mut start = 0;
    for i in 0..slab_count {
        let len = base + usize::from(i < rem);
        bounds.push((start, start + len));
        start += len;
    }
    bounds
}

/// Parallel radix sort: design spec §4.2 phase A/B/C.
#[allow(clippy::too_many_arguments)]
pub fn parallel_radix_sort<K: Sync, A: SortAdapter<K>>(
    indices: &mut [usize],
    aux: &mut [usize],
    keys: &[K],
    hashes: &[u64],
    hash_bits: u32,
    cfg: &Config,
    pool: &WorkerPool,
    adapter: &A,
) {
    let n = indices.len();
    if n <= 1 {
        return;
    }
    let bits = cfg.radix_bits.min(hash_bits).max(1);
    let shift = hash_bits - bits;
    let mask = (1u64 << bits) - 1;
    let num_buckets = 1usize << bits;

    let slabs = slab_bounds(n, std::mem::size_of::<usize>(), cfg, pool.thread_count());

    // Phase A: each slab counts its own bucket histogram independently.
    let indices_ref: &[usize] = indices;
    let slab_counts: Mutex<Vec<Vec<usize>>> = Mutex::new(vec![Vec::new(); slabs.len()]);
    std::thread::scope(|scope| {
        for (slab_idx, &(lo, hi)) in slabs.iter().enumerate() {
            let slab_counts = &slab_counts;
            scope.spawn(move || {
                let mut counts = vec![0usize; num_buckets];
                for &idx in &indices_ref[lo..hi] {
                    let bucket = ((hashes[idx] >> shift) & mask) as usize;
                    counts[bucket] += 1;
                }
                slab_counts.lock().unwrap()[slab_idx] = counts;
            });
        }
    });

    // Phase B: fold per-slab histograms into global bucket offsets and,
    // within each bucket, per-slab write cursors. Cheap relative to A/C,
    // done inline rather than through the pool.
    let slab_counts = slab_counts.into_inner().unwrap();
    let mut bucket_totals = vec![0usize; num_buckets + 1];
    for counts in &slab_counts {
        for b in 0..num_buckets {
            bucket_totals[b + 1] += counts[b];
        }
    }
    for b in 0..num_buckets {
        bucket_totals[b + 1] += bucket_totals[b];
    }
    let bucket_starts = bucket_totals.clone();

    // cursors[slab][bucket] = write offset this slab starts at for that bucket.
    let mut cursors = vec![vec![0usize; num_buckets]; slabs.len()];
    let mut running = bucket_starts.clone();
    for (slab_idx, counts) in slab_counts.iter().enumerate() {
        for b in 0..num_buckets {
            cursors[slab_idx][b] = running[b];
            running[b] += counts[b];
        }
    }

    // Phase C: each slab re-scans its own range and writes into `aux` at
    // its precomputed, disjoint cursor positions — no two slabs ever write
    // the same aux index, so this needs no synchronization.
    {
        let aux_ptr = aux.as_mut_ptr();
        let aux_len = aux.len();
        std::thread::scope(|scope| {
            for (slab_idx, &(lo, hi)) in slabs.iter().enumerate() {
                let mut local_cursors = cursors[slab_idx].clone();
                // SAFETY: phase B guarantees every slab's cursor ranges are
                // disjoint from every other slab's, so handing each worker
                // a raw pointer into the same backing allocation is sound:
                // no two threads ever write the same index.
                let aux_chunk = unsafe { std::slice::from_raw_parts_mut(aux_ptr, aux_len) };
                scope.spawn(move || {
                    for &idx in &indices_ref[lo..hi] {
                        let bucket = ((hashes[idx] >> shift) & mask) as usize;
                        aux_chunk[local_cursors[bucket]] = idx;
                        local_cursors[bucket] += 1;
                    }
                });
            }
        });
    }

    // Recurse sequentially per bucket; large top-level buckets already
    // parallelized the expensive pass, so further recursion does not
    // resubmit to the pool (design spec §4.8: no recursive pool entry).
    for b in 0..num_buckets {
        let lo = bucket_starts[b];
        let hi = bucket_starts[b + 1];
        if hi - lo <= 1 {
            continue;
        }
        radix::sort(&mut indices[lo..hi], &mut aux[lo..hi], keys, hashes, shift, cfg, adapter);
    }
    indices.copy_from_slice(aux);
}

/// Wrappers asserting `Send` for raw pointers crossing into pool tasks.
/// Sound here because [`parallel_quicksort`] blocks on `pool.wait()`
/// before its borrow of `indices`/`keys`/`adapter` ends, so no task
/// outlives the data it points into, and every submitted range is
/// disjoint from every other by construction (a real in-place partition,
/// not a blind bisect, hands the left partition to one task and the right
/// partition to another, recursively, never both to the same task).
#[derive(Clone, Copy)]
struct SendMutPtr(*mut usize);
unsafe impl Send for SendMutPtr {}

#[derive(Clone, Copy)]
struct SendConstPtr<T>(*const T);
unsafe impl<T> Send for SendConstPtr<T> {}

/// Parallel quicksort: partitions each range in place around a
/// median-of-three pivot (design spec §4.2), then publishes the left and
/// right partitions as work-pool tasks, with priority falling as
/// recursion depth grows (design spec §4.2, "depth-based priority") so the
/// pool drains wide, cheap splits before narrow, expensive tail work. Fan-
/// out is capped to `log2(pool.thread_count())` levels of splitting; once
/// that budget is spent, a task finishes its range inline with
/// [`super::quicksort`] instead of splitting further.
/// Task closures must be `'static`, so the pool, the adapter, and the
/// key/index slices are all threaded through as raw pointers wrapped in
/// `Send`-asserting newtypes rather than borrows — the same `Arc<WorkerPool>`
/// every recursive submission re-shares, not a second pool (design spec
/// §4.8: no recursive *pool construction*; resubmitting to the one pool
/// already running is the intended fan-out mechanism).
pub fn parallel_quicksort<K: Sync + 'static, A: SortAdapter<K> + 'static>(
    indices: &mut [usize],
    keys: &[K],
    cfg: &Config,
    pool: &Arc<WorkerPool>,
    adapter: &A,
) {
    let elt_size = std::mem::size_of::<usize>();
    let chunk_elems = (cfg.thread_chunk_bytes / elt_size.max(1)).max(1);
    let max_splits = pool.thread_count().next_power_of_two().trailing_zeros();

    let indices_ptr = SendMutPtr(indices.as_mut_ptr());
    let keys_ptr = SendConstPtr(keys.as_ptr());
    let adapter_ptr = SendConstPtr(adapter as *const A);
    let range_len = indices.len();
    let key_count = keys.len();

    submit_range(
        indices_ptr,
        range_len,
        keys_ptr,
        key_count,
        adapter_ptr,
        chunk_elems,
        max_splits,
        Arc::clone(pool),
    );
    pool.wait();
}

#[allow(clippy::too_many_arguments)]
fn submit_range<K: Sync + 'static, A: SortAdapter<K> + 'static>(
    indices: SendMutPtr,
    range_len: usize,
    keys: SendConstPtr<K>,
    key_count: usize,
    adapter: SendConstPtr<A>,
    chunk_elems: usize,
    splits_remaining: u32,
    pool: Arc<WorkerPool>,
) {
    // SAFETY: see the justification on `SendMutPtr`/`SendConstPtr` above.
    let range = unsafe { std::slice::from_raw_parts_mut(indices.0, range_len) };
    let keys_slice = unsafe { std::slice::from_raw_parts(keys.0, key_count) };
    let adapter_ref: &A = unsafe { &*adapter.0 };

    if range_len <= chunk_elems || splits_remaining == 0 || range_len <= 1 {
        quicksort::sort(range, keys_slice, adapter_ref);
        return;
    }

    // Partition in place first — the same median-of-three Hoare partition
    // `quicksort::sort` uses — so the two halves submitted below are
    // actually each other's complement in sorted order, not an arbitrary
    // bisection of two independently-sorted ranges.
    let pivot = quicksort::partition(range, keys_slice, 0, range_len, adapter_ref);
    let left_len = pivot;
    let right_start = pivot + 1;
    let right_len = range_len - right_start;
    let priority = range_len as u32;

    if left_len > 0 {
        let left = SendMutPtr(indices.0);
        let pool_for_left_task = Arc::clone(&pool);
        pool.submit(priority, move || {
            submit_range(
                left,
                left_len,
                keys,
                key_count,
                adapter,
                chunk_elems,
                splits_remaining - 1,
                pool_for_left_task,
            );
        });
    }
    if right_len > 0 {
        let right = SendMutPtr(unsafe { indices.0.add(right_start) });
        let pool_for_right_task = Arc::clone(&pool);
        pool.submit(priority, move || {
            submit_range(
                right,
                right_len,
                keys,
                key_count,
                adapter,
                chunk_elems,
                splits_remaining - 1,
                pool_for_right_task,
            );
        });
    }
}
