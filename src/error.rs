//! Error taxonomy for the sorter (design spec §7).
//!
//! Every failure the core can raise belongs to one of five kinds; the
//! scheduler never catches and retries, it aborts the current sort,
//! releases temp files, drains the worker pool, and surfaces a single
//! [`SortError`] to the caller.

use std::io;

use crate::bucket::BucketId;

/// Result type used throughout the crate.
pub type SortResult<T> = Result<T, SortError>;

#[derive(Debug, thiserror::Error)]
pub enum SortError {
    /// Any failure returned by a stream operation (bucket file I/O, a
    /// caller-supplied input/output stream).
    #[error("I/O failure on bucket {bucket:?}: {source}")]
    Io {
        bucket: Option<BucketId>,
        #[source]
        source: io::Error,
    },

    /// `read_key` returned EOF at a position other than a record
    /// boundary, as detected by `fetch_record`.
    #[error("truncated input in bucket {bucket:?} at offset {offset}")]
    TruncatedInput { bucket: BucketId, offset: u64 },

    /// A single record could not be made to fit the sort buffer.
    #[error(
        "record of {record_bytes} bytes does not fit the sort buffer \
         ({buffer_bytes} bytes); raise `sort_buffer_bytes`"
    )]
    BufferTooSmall {
        record_bytes: usize,
        buffer_bytes: usize,
    },

    /// The merger observed a run that is not monotonic: an internal
    /// invariant violation, never expected in a correct implementation.
    #[error("corrupt run in bucket {bucket:?}: {detail}")]
    CorruptRun { bucket: BucketId, detail: String },

    /// Contradictory tunables, reported synchronously at `sort_begin`.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

impl SortError {
    pub(crate) fn io(bucket: Option<BucketId>, source: io::Error) -> Self {
        SortError::Io { bucket, source }
    }
}

impl From<io::Error> for SortError {
    fn from(source: io::Error) -> Self {
        SortError::Io {
            bucket: None,
            source,
        }
    }
}
