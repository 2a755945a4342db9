//! Bucket store (BS, design spec §4.3): owns one "bucket" — a logical
//! sequence of records backed by a temporary file, the caller's source
//! stream, or the caller's destination stream — plus the file-descriptor
//! swap-out discipline (§5, "resource policy") that keeps a large sort
//! from exhausting the process's FD limit.
//!
//! `fcoreutils` has no equivalent (its sorts are single-pass, in-memory);
//! this module's swap-out/reopen dance is grounded on the "Swap-out under
//! FD pressure" design note (§9) and the wider pool's temp-file handling
//! (`sjlynch-RETL`'s streaming zstd readers, which similarly open/close
//! many files across one job).

use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use tempfile::TempPath;

use crate::error::{SortError, SortResult};
use crate::stream::{FastBuf, Stream};

/// Opaque bucket identifier. Stable for the lifetime of the owning
/// [`BucketStore`]; never reused even after `drop_bucket`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketState {
    Fresh,
    OpenForWrite,
    OpenForRead,
    SwappedOut,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BucketFlags {
    pub source: bool,
    pub final_: bool,
}

enum Backing {
    Temp(TempBacking),
    Source(Box<dyn Stream>),
    Dest(Box<dyn Stream>),
}

struct TempBacking {
    /// Present once the file has been created at least once.
    guard: Option<TempPath>,
    /// `None` when swapped out or never yet opened.
    open: Option<FastBuf<File>>,
    stream_buffer_bytes: usize,
}

impl TempBacking {
    fn ensure_open_for_write(&mut self, dir: &std::path::Path, name: &str) -> io::Result<()> {
        if self.open.is_some() {
            return Ok(());
        }
        match &self.guard {
            None => {
                let named = tempfile::Builder::new()
                    .prefix(name)
                    .tempfile_in(dir)?;
                let (file, guard) = named.into_parts();
                self.guard = Some(guard);
                self.open = Some(FastBuf::new(file, self.stream_buffer_bytes));
            }
            Some(guard) => {
                let mut file = OpenOptions::new().read(true).write(true).open(guard)?;
                file.seek(SeekFrom::End(0))?;
                self.open = Some(FastBuf::new(file, self.stream_buffer_bytes));
            }
        }
        Ok(())
    }

    fn ensure_open_for_read(&mut self) -> io::Result<()> {
        if self.open.is_none() {
            let guard = self
                .guard
                .as_ref()
                .expect("read requested on a bucket that was never written");
            let file = OpenOptions::new().read(true).write(true).open(guard)?;
            self.open = Some(FastBuf::new(file, self.stream_buffer_bytes));
        }
        let fb = self.open.as_mut().unwrap();
        fb.flush()?;
        fb.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    fn swap_out(&mut self) -> io::Result<()> {
        if let Some(mut fb) = self.open.take() {
            fb.flush()?;
        }
        Ok(())
    }

    fn current_size(&mut self) -> io::Result<u64> {
        match self.open.as_mut() {
            Some(fb) => fb.filesize(),
            None => match &self.guard {
                Some(guard) => Ok(std::fs::metadata(guard)?.len()),
                None => Ok(0),
            },
        }
    }
}

/// One bucket: see design spec §3 for the full state-machine invariants.
pub struct Bucket {
    id: BucketId,
    backing: Backing,
    state: BucketState,
    runs: u32,
    hash_bits_remaining: u32,
    flags: BucketFlags,
}

impl Bucket {
    pub fn id(&self) -> BucketId {
        self.id
    }

    pub fn state(&self) -> BucketState {
        self.state
    }

    pub fn runs(&self) -> u32 {
        self.runs
    }

    pub fn set_runs(&mut self, runs: u32) {
        self.runs = runs;
    }

    pub fn add_run(&mut self) {
        self.runs += 1;
    }

    pub fn hash_bits_remaining(&self) -> u32 {
        self.hash_bits_remaining
    }

    pub fn flags(&self) -> BucketFlags {
        self.flags
    }

    /// Returns `&mut dyn Stream` for callers (IS/EM/RS) that only need
    /// the generic stream contract.
    pub fn as_stream(&mut self) -> &mut dyn Stream {
        self
    }
}

impl Read for Bucket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.backing {
            Backing::Temp(t) => t
                .open
                .as_mut()
                .expect("bucket not open for read/write")
                .read(buf),
            Backing::Source(s) => s.read(buf),
            Backing::Dest(s) => s.read(buf),
        }
    }
}

impl Write for Bucket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.backing {
            Backing::Temp(t) => t
                .open
                .as_mut()
                .expect("bucket not open for read/write")
                .write(buf),
            Backing::Source(s) => s.write(buf),
            Backing::Dest(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.backing {
            Backing::Temp(t) => match t.open.as_mut() {
                Some(fb) => fb.flush(),
                None => Ok(()),
            },
            Backing::Source(s) => s.flush(),
            Backing::Dest(s) => s.flush(),
        }
    }
}

impl Seek for Bucket {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.backing {
            Backing::Temp(t) => t
                .open
                .as_mut()
                .expect("bucket not open for read/write")
                .seek(pos),
            Backing::Source(s) => s.seek(pos),
            Backing::Dest(s) => s.seek(pos),
        }
    }
}

/// Owns the live-bucket list, the temp-file naming counter, and the
/// fd-pressure swap-out policy (design spec §5).
pub struct BucketStore {
    temp_dir: PathBuf,
    name_counter: AtomicU64,
    pid_tag: u32,
    stream_buffer_bytes: usize,
    max_open_files: usize,
    buckets: HashMap<BucketId, Bucket>,
    next_id: u64,
    /// Most-recently-opened temp buckets at the back; used to pick a
    /// swap-out victim under fd pressure. Source/dest/swapped-out
    /// buckets are never present here.
    open_lru: VecDeque<BucketId>,
}

impl BucketStore {
    pub fn new(
        temp_dir: Option<PathBuf>,
        stream_buffer_bytes: usize,
        max_open_files: usize,
    ) -> Self {
        BucketStore {
            temp_dir: temp_dir.unwrap_or_else(std::env::temp_dir),
            name_counter: AtomicU64::new(0),
            pid_tag: std::process::id(),
            stream_buffer_bytes,
            max_open_files: max_open_files.max(4),
            buckets: HashMap::new(),
            next_id: 0,
            open_lru: VecDeque::new(),
        }
    }

    fn alloc_id(&mut self) -> BucketId {
        let id = BucketId(self.next_id);
        self.next_id += 1;
        id
    }

    fn temp_name(&self) -> String {
        let n = self.name_counter.fetch_add(1, AtomicOrdering::Relaxed);
        format!("xmsort-{}-{}.", self.pid_tag, n)
    }

    /// Allocates a fresh temp-backed bucket; no file is created until the
    /// first write.
    pub fn new_bucket(&mut self, hash_bits_remaining: u32) -> BucketId {
        let id = self.alloc_id();
        let bucket = Bucket {
            id,
            backing: Backing::Temp(TempBacking {
                guard: None,
                open: None,
                stream_buffer_bytes: self.stream_buffer_bytes,
            }),
            state: BucketState::Fresh,
            runs: 0,
            hash_bits_remaining,
            flags: BucketFlags::default(),
        };
        self.buckets.insert(id, bucket);
        id
    }

    /// Wraps the caller's input stream as the source bucket: `runs = 0`,
    /// never unlinked by `drop_bucket`.
    pub fn wrap_source(&mut self, stream: Box<dyn Stream>, hash_bits: u32) -> BucketId {
        let id = self.alloc_id();
        let bucket = Bucket {
            id,
            backing: Backing::Source(stream),
            state: BucketState::OpenForRead,
            runs: 0,
            hash_bits_remaining: hash_bits,
            flags: BucketFlags {
                source: true,
                final_: false,
            },
        };
        self.buckets.insert(id, bucket);
        id
    }

    /// Wraps the caller's output stream as the final bucket: never
    /// unlinked by `drop_bucket`.
    pub fn wrap_dest(&mut self, stream: Box<dyn Stream>) -> BucketId {
        let id = self.alloc_id();
        let bucket = Bucket {
            id,
            backing: Backing::Dest(stream),
            state: BucketState::OpenForWrite,
            runs: 0,
            hash_bits_remaining: 0,
            flags: BucketFlags {
                source: false,
                final_: true,
            },
        };
        self.buckets.insert(id, bucket);
        id
    }

    pub fn get(&self, id: BucketId) -> &Bucket {
        self.buckets.get(&id).expect("unknown bucket id")
    }

    fn touch_lru(&mut self, id: BucketId) {
        self.open_lru.retain(|&x| x != id);
        self.open_lru.push_back(id);
    }

    fn untrack_lru(&mut self, id: BucketId) {
        self.open_lru.retain(|&x| x != id);
    }

    /// Enforces the open-file budget by swapping out the least-recently
    /// used temp bucket(s) until `id` can be opened without exceeding it.
    fn enforce_fd_budget(&mut self, keep: BucketId) -> SortResult<()> {
        while self.open_lru.len() >= self.max_open_files {
            let Some(victim) = self.open_lru.iter().copied().find(|&x| x != keep) else {
                break;
            };
            self.swap_out(victim)?;
        }
        Ok(())
    }

    /// Opens `id` for writing: fresh -> open-for-write (first write);
    /// repeatable across stages as long as no read has happened since.
    pub fn open_write(&mut self, id: BucketId) -> SortResult<&mut Bucket> {
        self.enforce_fd_budget(id)?;
        let name = self.temp_name();
        let dir = self.temp_dir.clone();
        let bucket = self.buckets.get_mut(&id).expect("unknown bucket id");
        if let Backing::Temp(t) = &mut bucket.backing {
            t.ensure_open_for_write(&dir, &name)
                .map_err(|e| SortError::io(Some(id), e))?;
            bucket.state = BucketState::OpenForWrite;
            self.touch_lru(id);
        } else {
            bucket.state = BucketState::OpenForWrite;
        }
        Ok(self.buckets.get_mut(&id).unwrap())
    }

    /// Opens `id` for reading: flushes any pending writes, seeks to
    /// start, and freezes `size` (design spec §4.3).
    pub fn open_read(&mut self, id: BucketId) -> SortResult<&mut Bucket> {
        self.enforce_fd_budget(id)?;
        let bucket = self.buckets.get_mut(&id).expect("unknown bucket id");
        match &mut bucket.backing {
            Backing::Temp(t) => {
                t.ensure_open_for_read()
                    .map_err(|e| SortError::io(Some(id), e))?;
                bucket.state = BucketState::OpenForRead;
                self.touch_lru(id);
            }
            Backing::Source(s) => {
                s.rewind_stream().map_err(|e| SortError::io(Some(id), e))?;
                bucket.state = BucketState::OpenForRead;
            }
            Backing::Dest(_) => {
                panic!("the final output bucket is never read back");
            }
        }
        Ok(self.buckets.get_mut(&id).unwrap())
    }

    /// Bytes currently committed to `id`. Meaningful only when the
    /// bucket is not presently open for write.
    pub fn size(&mut self, id: BucketId) -> SortResult<u64> {
        let bucket = self.buckets.get_mut(&id).expect("unknown bucket id");
        match &mut bucket.backing {
            Backing::Temp(t) => t.current_size().map_err(|e| SortError::io(Some(id), e)),
            Backing::Source(s) => s.filesize().map_err(|e| SortError::io(Some(id), e)),
            Backing::Dest(_) => Ok(0),
        }
    }

    /// Closes the open fastbuf but keeps the file name, marking the
    /// bucket swapped-out; a subsequent `open_read`/`open_write` reopens
    /// transparently.
    pub fn swap_out(&mut self, id: BucketId) -> SortResult<()> {
        let bucket = self.buckets.get_mut(&id).expect("unknown bucket id");
        if let Backing::Temp(t) = &mut bucket.backing {
            t.swap_out().map_err(|e| SortError::io(Some(id), e))?;
            bucket.state = BucketState::SwappedOut;
        }
        self.untrack_lru(id);
        Ok(())
    }

    /// Closes and unlinks the bucket's file (no-op for source/final
    /// buckets, which are never unlinked) and removes it from the live
    /// list.
    pub fn drop_bucket(&mut self, id: BucketId) -> SortResult<()> {
        self.untrack_lru(id);
        self.buckets.remove(&id);
        Ok(())
    }

    pub fn is_source(&self, id: BucketId) -> bool {
        self.buckets.get(&id).is_some_and(|b| b.flags.source)
    }

    pub fn is_final(&self, id: BucketId) -> bool {
        self.buckets.get(&id).is_some_and(|b| b.flags.final_)
    }

    pub fn runs(&self, id: BucketId) -> u32 {
        self.buckets.get(&id).map(|b| b.runs).unwrap_or(0)
    }

    pub fn set_runs(&mut self, id: BucketId, runs: u32) {
        if let Some(b) = self.buckets.get_mut(&id) {
            b.runs = runs;
        }
    }

    pub fn hash_bits_remaining(&self, id: BucketId) -> u32 {
        self.buckets
            .get(&id)
            .map(|b| b.hash_bits_remaining)
            .unwrap_or(0)
    }

    /// All bucket ids currently tracked, in arbitrary order. Used by the
    /// scheduler to pick the next stage.
    pub fn live_ids(&self) -> Vec<BucketId> {
        self.buckets.keys().copied().collect()
    }

    /// Temporarily removes several distinct buckets from the store so a
    /// caller can hold `&mut Bucket` to each of them at once — every
    /// stage (IS, EM, RS) needs at least one source and one destination
    /// bucket open simultaneously, which a single `&mut self` borrow
    /// cannot give out twice. Pair with [`BucketStore::return_many`] once
    /// done; ids must be distinct and already open via `open_read`/
    /// `open_write` (checkout preserves each bucket's current state).
    pub fn checkout_many(&mut self, ids: &[BucketId]) -> Vec<Bucket> {
        let mut unique = ids.to_vec();
        unique.sort_by_key(|id| id.0);
        debug_assert!(
            unique.windows(2).all(|w| w[0] != w[1]),
            "checkout_many requires distinct bucket ids"
        );
        ids.iter()
            .map(|id| {
                // A checked-out bucket is absent from `buckets` for the
                // duration; drop its LRU entry too so `enforce_fd_budget`
                // never tries to swap out an id the map no longer holds.
                self.untrack_lru(*id);
                self.buckets.remove(id).expect("unknown or already-checked-out bucket id")
            })
            .collect()
    }

    /// Returns buckets previously removed by [`BucketStore::checkout_many`],
    /// restoring LRU tracking for any that are open temp-backed buckets.
    pub fn return_many(&mut self, ids: &[BucketId], buckets: Vec<Bucket>) {
        assert_eq!(ids.len(), buckets.len());
        for (id, bucket) in ids.iter().zip(buckets) {
            let reopen = matches!(bucket.backing, Backing::Temp(_))
                && matches!(bucket.state, BucketState::OpenForRead | BucketState::OpenForWrite);
            self.buckets.insert(*id, bucket);
            if reopen {
                self.touch_lru(*id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
