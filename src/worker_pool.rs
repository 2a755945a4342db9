//! The fixed-size worker pool (WP, design spec §4.8): `T` long-lived
//! threads draining a priority work queue, lazily spun up by the first
//! parallel array-sort call and torn down once the last client releases
//! it. Grounded on the executor/work-manager shape in `rob-p-ggcat`'s
//! `work_manager.rs` (a fixed worker count pulling prioritized tasks off a
//! shared queue) rather than reaching for a shared global pool like
//! `rayon`'s: the design spec requires explicit priority ordering and a
//! pool scoped to one sort context, which a process-wide pool can't give
//! us without fighting its own scheduling.
//!
//! A task that panics is treated as fatal to the whole pool (design spec
//! §7: AS/WP failures abort the sort), not caught and retried.

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

type Task = Box<dyn FnOnce() + Send + 'static>;

struct PrioritizedTask {
    priority: u32,
    seq: u64,
    task: Task,
}

impl PartialEq for PrioritizedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for PrioritizedTask {}

impl PartialOrd for PrioritizedTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrioritizedTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Higher priority first; among equal priorities, earlier submission
        // first (FIFO), so reverse the sequence comparison too.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Shared {
    queue: Mutex<BinaryHeap<PrioritizedTask>>,
    not_empty: Condvar,
    shutdown: AtomicBool,
    next_seq: AtomicUsize,
    inflight: AtomicUsize,
    idle: Condvar,
}

/// A pool of `T` worker threads draining a shared priority queue.
///
/// Construction is the "lazy init" moment in design spec §4.8: callers
/// obtain a pool via [`WorkerPool::new`] only once they have decided a
/// parallel array-sort pass is worthwhile, and drop it (tearing the
/// threads down) once the sort context no longer needs parallelism.
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `threads` worker threads, each blocking on the shared queue
    /// until a task is submitted or the pool is dropped. `threads == 0` is
    /// rejected by callers upstream (design spec: `worker_threads == 0`
    /// means "no parallel AS", never "a zero-thread pool").
    pub fn new(threads: usize) -> Self {
        assert!(threads > 0, "WorkerPool requires at least one thread");
        let shared = Arc::new(Shared {
            queue: Mutex::new(BinaryHeap::new()),
            not_empty: Condvar::new(),
            shutdown: AtomicBool::new(false),
            next_seq: AtomicUsize::new(0),
            inflight: AtomicUsize::new(0),
            idle: Condvar::new(),
        });

        let handles = (0..threads)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || worker_loop(shared))
            })
            .collect();

        WorkerPool { shared, handles }
    }

    /// Number of worker threads in this pool.
    pub fn thread_count(&self) -> usize {
        self.handles.len()
    }

    /// Submits a task at the given priority (higher runs sooner). Tasks
    /// may themselves call `submit` again (the fan-out mechanism
    /// [`crate::array_sort`]'s parallel quicksort relies on) — what design
    /// spec §4.8 forbids is re-entering pool *construction*, i.e. a worker
    /// thread lazily spinning up a second, nested [`WorkerPool`].
    pub fn submit(&self, priority: u32, task: impl FnOnce() + Send + 'static) {
        let seq = self.shared.next_seq.fetch_add(1, AtomicOrdering::Relaxed) as u64;
        self.shared.inflight.fetch_add(1, AtomicOrdering::SeqCst);
        let mut queue = self.shared.queue.lock().unwrap();
        queue.push(PrioritizedTask {
            priority,
            seq,
            task: Box::new(task),
        });
        self.shared.not_empty.notify_one();
    }

    /// Blocks until every submitted task (including ones submitted by
    /// already-running tasks) has completed.
    pub fn wait(&self) {
        let queue = self.shared.queue.lock().unwrap();
        let _guard = self
            .shared
            .idle
            .wait_while(queue, |_| self.shared.inflight.load(AtomicOrdering::SeqCst) > 0)
            .unwrap();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, AtomicOrdering::SeqCst);
        self.shared.not_empty.notify_all();
        for handle in self.handles.drain(..) {
            // A panicked worker is a fatal condition upstream; propagate by
            // re-panicking here so the sort context's own drop/caller sees it.
            if let Err(payload) = handle.join() {
                std::panic::resume_unwind(payload);
            }
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let mut queue = shared.queue.lock().unwrap();
        loop {
            if let Some(item) = queue.pop() {
                drop(queue);
                (item.task)();
                let remaining = shared.inflight.fetch_sub(1, AtomicOrdering::SeqCst) - 1;
                if remaining == 0 {
                    shared.idle.notify_all();
                }
                break;
            }
            if shared.shutdown.load(AtomicOrdering::SeqCst) {
                return;
            }
            queue = shared.not_empty.wait(queue).unwrap();
        }
    }
}
