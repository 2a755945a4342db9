//! `xmsort` — an external-memory universal sorter.
//!
//! Given an input stream of caller-defined records and a [`SortAdapter`]
//! describing how to compare, read, and write them, [`sort`] produces an
//! output stream containing the same records in ascending key order,
//! spilling to temporary files and merging as needed to stay within a
//! bounded memory budget, and optionally collapsing equal-keyed records
//! via the adapter's `merge` callback.
//!
//! The crate is organized leaf-first:
//!
//! - [`adapter`] — the comparator/codec adapter (CCA) the caller supplies.
//! - [`array_sort`] — in-memory array sorting (quicksort, radix, parallel).
//! - [`bucket`] — the bucket store: on-disk or stream-backed run containers.
//! - [`stream`] — the abstract sequential byte stream ("fastbuf").
//! - [`internal_sort`] — presort stage: unsorted bucket -> one sorted run.
//! - [`external_merge`] — two-way and k-way merge of sorted runs.
//! - [`radix_split`] — hash-bucket partitioning of oversized buckets.
//! - [`scheduler`] — the top-level driver tying the stages together.
//! - [`worker_pool`] — the fixed-size priority thread pool used by AS.

#![allow(clippy::type_complexity)]

/// mimalloc as global allocator: the presort phase is alloc-heavy (one
/// allocation per record key read into the sort buffer's index), and
/// mimalloc's thread-local caching measurably helps there.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod adapter;
pub mod array_sort;
pub mod bucket;
pub mod config;
pub mod error;
pub mod external_merge;
pub mod internal_sort;
pub mod radix_split;
pub mod scheduler;
pub mod stream;
pub mod worker_pool;

pub use adapter::SortAdapter;
pub use config::Config;
pub use error::{SortError, SortResult};
pub use scheduler::sort;
