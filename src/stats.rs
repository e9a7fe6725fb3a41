//! Run statistics
//!
//! Counters are updated by workers while the run is live and snapshotted into
//! plain values once every worker has been joined.

use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Live counters for one worker, padded to its own cache line
#[derive(Debug, Default)]
pub struct WorkerCounters {
    batches: CachePadded<AtomicU64>,
    items: CachePadded<AtomicU64>,
    busy_nanos: CachePadded<AtomicU64>,
}

impl WorkerCounters {
    /// Record one processed batch
    pub fn record_batch(&self, items: usize, busy: Duration) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.items.fetch_add(items as u64, Ordering::Relaxed);
        let nanos = u64::try_from(busy.as_nanos()).unwrap_or(u64::MAX);
        self.busy_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Take a snapshot
    pub fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            batches: self.batches.load(Ordering::Relaxed),
            items: self.items.load(Ordering::Relaxed),
            busy: Duration::from_nanos(self.busy_nanos.load(Ordering::Relaxed)),
        }
    }
}

/// Snapshot of a single worker's activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Batches processed
    pub batches: u64,

    /// Items processed
    pub items: u64,

    /// Time spent inside the processing function
    pub busy: Duration,
}

/// Live counters shared by the sequencer
#[derive(Debug, Default)]
pub struct CommitCounters {
    committed: AtomicU64,
    max_pending: AtomicUsize,
}

impl CommitCounters {
    /// Record a committed unit
    pub fn record_commit(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Track the deepest pending map observed
    pub fn observe_pending(&self, depth: usize) {
        self.max_pending.fetch_max(depth, Ordering::Relaxed);
    }

    /// Units committed so far
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }

    /// Deepest pending map observed
    pub fn max_pending(&self) -> usize {
        self.max_pending.load(Ordering::Relaxed)
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Batches drawn from the source
    pub batches: u64,

    /// Items drawn from the source
    pub items: u64,

    /// Output units committed to the sink
    pub committed: u64,

    /// Largest number of units that waited for an earlier batch
    pub max_pending: usize,

    /// Wall-clock time of the run
    pub elapsed: Duration,

    /// Per-worker activity, indexed by worker
    pub workers: Vec<WorkerStats>,
}

impl RunStats {
    /// Items processed across all workers
    pub fn items_processed(&self) -> u64 {
        self.workers.iter().map(|w| w.items).sum()
    }

    /// Items per second over the whole run
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.items as f64 / secs
        }
    }
}
