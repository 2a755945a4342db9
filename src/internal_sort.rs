//! Internal sort (IS, design spec §4.4): the presort stage. Drains a
//! source stream into one or more sorted runs, each run sized to fit
//! `sort_buffer_bytes`, handing the in-memory ordering off to
//! [`crate::array_sort`] and optionally collapsing equal-keyed records via
//! the adapter's `merge` callback before the run is written out.
//!
//! A record whose tail does not fit any sort buffer at all (design spec
//! §9, "giant records") is copied straight through as a degenerate
//! one-record run, bypassing the in-memory array entirely; a record that
//! merely overruns the *remaining* space in an already-partly-filled
//! batch is kept in that batch anyway; since `read_key` has already
//! consumed it from the stream and stream position cannot be rewound,
//! rejecting it would lose the record. The buffer target is therefore a
//! soft cap, not a hard one.
//!
//! Run order within the destination bucket carries no meaning: external
//! merge re-establishes key order across every run it finds, however they
//! were interleaved here.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::adapter::SortAdapter;
use crate::array_sort;
use crate::bucket::Bucket;
use crate::config::Config;
use crate::error::SortResult;
use crate::stream::Stream;
use crate::worker_pool::WorkerPool;

#[derive(Debug, Clone, Copy, Default)]
pub struct InternalSortOutcome {
    pub runs_written: u32,
    pub records_written: u64,
    pub records_unified: u64,
}

/// Drains `src` into `dst` as a sequence of sorted runs. `hash_bits` is
/// the hash width still available for this bucket (design spec §4.3); an
/// adapter with no hash at all (`adapter.hash_bits() == 0`) always falls
/// back to quicksort regardless of what is passed here.
pub fn internal_sort<K, A>(
    adapter: &A,
    src: &mut dyn Stream,
    dst: &mut Bucket,
    hash_bits: u32,
    cfg: &Config,
    pool: Option<&Arc<WorkerPool>>,
) -> SortResult<InternalSortOutcome>
where
    K: Ord + Clone + Send + Sync + 'static,
    A: SortAdapter<K> + 'static,
{
    let mut outcome = InternalSortOutcome::default();
    loop {
        let Batch { records, wrote_giant, exhausted } = fill_batch(adapter, src, dst, cfg)?;
        if !records.is_empty() {
            write_run(adapter, dst, records, hash_bits, cfg, pool, &mut outcome)?;
        }
        if wrote_giant {
            outcome.runs_written += 1;
            outcome.records_written += 1;
        }
        if exhausted {
            break;
        }
    }
    Ok(outcome)
}

struct Batch<K> {
    records: Vec<(K, Vec<u8>)>,
    wrote_giant: bool,
    exhausted: bool,
}

fn fill_batch<K, A>(adapter: &A, src: &mut dyn Stream, dst: &mut dyn Stream, cfg: &Config) -> SortResult<Batch<K>>
where
    K: Ord + Clone + Send + 'static,
    A: SortAdapter<K>,
{
    let mut records = Vec::new();
    let mut used = 0usize;
    loop {
        let Some(key) = adapter.read_key(src)? else {
            return Ok(Batch {
                records,
                wrote_giant: false,
                exhausted: true,
            });
        };
        match adapter.fetch_record(src, &key, cfg.sort_buffer_bytes)? {
            Some(tail) => {
                used += adapter.record_size(&key, &tail);
                records.push((key, tail));
                if used >= cfg.sort_buffer_bytes {
                    return Ok(Batch {
                        records,
                        wrote_giant: false,
                        exhausted: false,
                    });
                }
            }
            None => {
                // Does not fit even an empty sort buffer: write it straight
                // through as its own run and stop collecting for this one
                // (the batch gathered so far, if any, becomes its own run
                // too — see `internal_sort`, run order is unconstrained).
                adapter.write_record(src, dst, &key)?;
                return Ok(Batch {
                    records,
                    wrote_giant: true,
                    exhausted: false,
                });
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn write_run<K, A>(
    adapter: &A,
    dst: &mut Bucket,
    mut batch: Vec<(K, Vec<u8>)>,
    hash_bits: u32,
    cfg: &Config,
    pool: Option<&Arc<WorkerPool>>,
    outcome: &mut InternalSortOutcome,
) -> SortResult<()>
where
    K: Ord + Clone + Send + Sync + 'static,
    A: SortAdapter<K> + 'static,
{
    let keys: Vec<K> = batch.iter().map(|(k, _)| k.clone()).collect();
    let adapter_hash_bits = adapter.hash_bits();
    let hashes: Option<Vec<u64>> = if adapter_hash_bits > 0 {
        Some(
            keys.iter()
                .map(|k| adapter.hash(k).expect("hash_bits() > 0 implies hash() returns Some"))
                .collect(),
        )
    } else {
        None
    };
    let total_bytes: usize = batch.iter().map(|(k, tail)| adapter.record_size(k, tail)).sum();
    let elt_size = (total_bytes / batch.len().max(1)).max(1);

    let mut indices: Vec<usize> = (0..batch.len()).collect();
    array_sort::sort_indices(
        &mut indices,
        &keys,
        hashes.as_deref(),
        hash_bits.min(adapter_hash_bits),
        elt_size,
        cfg,
        pool,
        adapter,
    );

    let unify = adapter.unify();
    let mut slots: Vec<Option<(K, Vec<u8>)>> = batch.drain(..).map(Some).collect();
    let mut pending: Option<(K, Vec<u8>)> = None;

    for idx in indices {
        let record = slots[idx].take().expect("each sorted index is visited exactly once");
        pending = match pending.take() {
            None => Some(record),
            Some((pk, pt)) => {
                let (key, tail) = record;
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
    outcome.runs_written += 1;
    Ok(())
}
