//! The comparator & codec adapter (CCA, design spec §4.1) — the single
//! seat of caller-supplied behavior. Every other component in this crate
//! is polymorphic purely through this trait, in the spirit of the
//! "polymorphism over records" design note: the array-sort hot loop is
//! generic over `K: Ord`, while the scheduler/IS/EM/RS boundary takes
//! `&dyn SortAdapter<K>` since per-call dispatch cost there is negligible
//! next to the I/O it wraps.

use std::cmp::Ordering;

use crate::error::SortResult;
use crate::stream::Stream;

/// Caller-supplied behavior the sorter needs to move, compare, and
/// optionally collapse records of type `K` (the key) plus an opaque byte
/// tail that travels alongside it on the wire.
///
/// `K` stands in for the "key object" of design spec §4.1; the data tail
/// is never materialized as a Rust type, only as the byte range a stream
/// read/write touches, matching the "opaque value" framing of §3.
pub trait SortAdapter<K>: Send + Sync
where
    K: Ord + Clone + Send + 'static,
{
    /// Three-way key comparison. Defaults to the key's own `Ord`; adapters
    /// whose desired order differs from `K: Ord` (e.g. reverse, or a
    /// field within a larger struct) should wrap `K` in a newtype instead
    /// of overriding this — kept overridable here only so an adapter can
    /// special-case orderings `Ord` cannot express cheaply (NaN handling,
    /// locale collation).
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }

    /// Reads one key from `src`. Returns `Ok(None)` on a clean end of
    /// stream (record boundary); any other failure to find a well-formed
    /// key is the adapter's responsibility to surface as `Err`, which the
    /// sorter reports as `SortError::TruncatedInput`.
    fn read_key(&self, src: &mut dyn Stream) -> SortResult<Option<K>>;

    /// Copies the key just read (plus its data tail) from `src` to `dst`
    /// verbatim. Used by the external-merge stages, which never
    /// materialize the tail in memory.
    fn write_record(&self, src: &mut dyn Stream, dst: &mut dyn Stream, key: &K) -> SortResult<()>;

    /// Reads the data tail immediately following `key` in `src` into
    /// memory, provided the whole (key, tail) pair fits within `limit`
    /// bytes. Returns `Ok(None)` for a record that does not fit — the
    /// internal-sort stage falls back to writing it straight through via
    /// [`SortAdapter::write_record`] as a degenerate one-record run
    /// (design spec §9, "giant records").
    fn fetch_record(&self, src: &mut dyn Stream, key: &K, limit: usize) -> SortResult<Option<Vec<u8>>>;

    /// Writes a fully in-memory record (key + tail) to `dst`.
    fn store_record(&self, dst: &mut dyn Stream, key: &K, tail: &[u8]) -> SortResult<()>;

    /// Called on two in-memory records with equal keys during presort
    /// unification. Returns the survivor, or `None` to drop both. Only
    /// invoked when [`SortAdapter::unify`] returns `true`.
    fn merge(&self, _a: (&K, &[u8]), _b: (&K, &[u8])) -> Option<(K, Vec<u8>)> {
        None
    }

    /// Streaming variant of [`SortAdapter::merge`], invoked by the
    /// external-merge stages when unification is enabled but the two
    /// equal-keyed records were never brought into memory together. Must
    /// consume exactly one record from each of `src1`/`src2` and write the
    /// consolidated result (zero or one records) to `dst`.
    fn merge_streaming(
        &self,
        _src1: &mut dyn Stream,
        _src2: &mut dyn Stream,
        _dst: &mut dyn Stream,
        _k1: &K,
        _k2: &K,
    ) -> SortResult<()> {
        panic!("merge_streaming invoked but not implemented by this adapter");
    }

    /// A monotone hash of `key`: `h: Key -> [0, 2^hash_bits())` with
    /// `compare(k1, k2) != Greater => h(k1) <= h(k2)`. Unsound to report
    /// when `compare`'s order and the hash disagree, so adapters that
    /// cannot guarantee monotonicity must return `None` here rather than
    /// supply a general-purpose hash. `None` falls back to quicksort-only
    /// AS and rules out RS entirely.
    fn hash(&self, _key: &K) -> Option<u64> {
        None
    }

    /// Number of bits `H` the hash in [`SortAdapter::hash`] occupies.
    /// Meaningless when `hash` always returns `None`.
    fn hash_bits(&self) -> u32 {
        0
    }

    /// Whether equal-keyed records should be collapsed via
    /// [`SortAdapter::merge`] / [`SortAdapter::merge_streaming`].
    fn unify(&self) -> bool {
        false
    }

    /// In-memory footprint of one (key, tail) pair, used to decide how
    /// many records fit in one presort batch. Default assumes the key
    /// occupies `size_of::<K>()` plus the tail bytes; override if `K`
    /// itself owns heap data whose size should be counted too.
    fn record_size(&self, _key: &K, tail: &[u8]) -> usize {
        std::mem::size_of::<K>() + tail.len()
    }
}
