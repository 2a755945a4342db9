//! Tunables recognized by the sorter (design spec §6.4), wrapped in a
//! validating builder the way `fcoreutils`'s `SortConfig` validates key
//! definitions before a sort starts — except here the validation runs
//! once, synchronously, at `sort_begin`, and contradictions are reported
//! as [`crate::error::SortError::ConfigInvalid`] rather than a CLI exit
//! code.

use crate::error::{SortError, SortResult};

/// All tunables are positive integers; defaults below are
/// implementation-defined, chosen for a multi-gigabyte sort on a modern
/// workstation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Size of the sort buffer in bytes. Must be >= 2x the declared max
    /// record size: the buffer is split into two halves so radix sort
    /// always has an auxiliary half to split into.
    pub sort_buffer_bytes: usize,

    /// Per-stream fastbuf size.
    pub stream_buffer_bytes: usize,

    /// Below this many bytes, array-sort falls back to quicksort even
    /// when a monotone hash is available.
    pub radix_threshold_bytes: usize,

    /// Preferred radix width in bits for one count/place pass.
    pub radix_bits: u32,
    /// Radix sort is not attempted with fewer hash bits than this.
    pub min_radix_bits: u32,
    /// Radix-split bit width never exceeds this.
    pub max_radix_bits: u32,

    /// Lower bound (in bits: fan-in = 2^bits) on k-way merge fan-in.
    pub min_multiway_bits: u32,
    /// Upper bound on k-way merge fan-in.
    pub max_multiway_bits: u32,

    /// Number of worker-pool threads; 0 disables AS parallelism.
    pub worker_threads: usize,
    /// Arrays at or above this byte size are eligible for parallel AS.
    pub thread_threshold_bytes: usize,
    /// Target slab size per worker in parallel radix phase A/C.
    pub thread_chunk_bytes: usize,

    /// Verbosity of `log` records emitted at stage/pass boundaries.
    /// 0 = silent, 1 = debug (stage selection, run counts), 2 = trace
    /// (per-record detail, only ever used in tests).
    pub trace_level: u8,

    /// Directory temp files are created under. `None` uses the platform
    /// default (`std::env::temp_dir()`).
    pub temp_dir: Option<std::path::PathBuf>,

    /// Maximum element size (bytes) any record's key may occupy in the
    /// sort buffer; used only for config validation (`sort_buffer_bytes`
    /// must leave room for at least one record per half-buffer).
    pub max_record_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sort_buffer_bytes: 64 * 1024 * 1024,
            stream_buffer_bytes: 256 * 1024,
            radix_threshold_bytes: 1024 * 1024,
            radix_bits: 8,
            min_radix_bits: 4,
            max_radix_bits: 16,
            min_multiway_bits: 2,
            max_multiway_bits: 6,
            worker_threads: 0,
            thread_threshold_bytes: 4 * 1024 * 1024,
            thread_chunk_bytes: 256 * 1024,
            trace_level: 0,
            temp_dir: None,
            max_record_bytes: 4096,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder(Config::default())
    }

    /// Validates cross-field constraints. Called once by `sort_begin`;
    /// mirrors `fcoreutils::sort::parse_buffer_size` in spirit (reject
    /// nonsensical input early with a descriptive message) but checks
    /// *relationships* between tunables rather than a single string.
    pub fn validate(&self) -> SortResult<()> {
        if self.sort_buffer_bytes < 2 * self.max_record_bytes {
            return Err(SortError::ConfigInvalid(format!(
                "sort_buffer_bytes ({}) must be at least 2x max_record_bytes ({})",
                self.sort_buffer_bytes, self.max_record_bytes
            )));
        }
        if self.min_radix_bits > self.max_radix_bits {
            return Err(SortError::ConfigInvalid(format!(
                "min_radix_bits ({}) exceeds max_radix_bits ({})",
                self.min_radix_bits, self.max_radix_bits
            )));
        }
        if self.min_multiway_bits > self.max_multiway_bits {
            return Err(SortError::ConfigInvalid(format!(
                "min_multiway_bits ({}) exceeds max_multiway_bits ({})",
                self.min_multiway_bits, self.max_multiway_bits
            )));
        }
        if self.radix_bits == 0 {
            return Err(SortError::ConfigInvalid(
                "radix_bits must be positive".to_string(),
            ));
        }
        if self.stream_buffer_bytes == 0 {
            return Err(SortError::ConfigInvalid(
                "stream_buffer_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder so call sites read `Config::builder().worker_threads(8).build()`
/// instead of constructing the struct literal by hand.
pub struct ConfigBuilder(Config);

macro_rules! setter {
    ($name:ident: $ty:ty) => {
        pub fn $name(mut self, value: $ty) -> Self {
            self.0.$name = value;
            self
        }
    };
}

impl ConfigBuilder {
    setter!(sort_buffer_bytes: usize);
    setter!(stream_buffer_bytes: usize);
    setter!(radix_threshold_bytes: usize);
    setter!(radix_bits: u32);
    setter!(min_radix_bits: u32);
    setter!(max_radix_bits: u32);
    setter!(min_multiway_bits: u32);
    setter!(max_multiway_bits: u32);
    setter!(worker_threads: usize);
    setter!(thread_threshold_bytes: usize);
    setter!(thread_chunk_bytes: usize);
    setter!(trace_level: u8);
    setter!(max_record_bytes: usize);

    pub fn temp_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.0.temp_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> SortResult<Config> {
        self.0.validate()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_undersized_sort_buffer() {
        let err = Config::builder()
            .max_record_bytes(1024)
            .sort_buffer_bytes(1024)
            .build()
            .unwrap_err();
        assert!(matches!(err, SortError::ConfigInvalid(_)));
    }

    #[test]
    fn rejects_inverted_radix_bounds() {
        let err = Config::builder()
            .min_radix_bits(10)
            .max_radix_bits(4)
            .build()
            .unwrap_err();
        assert!(matches!(err, SortError::ConfigInvalid(_)));
    }
}
