//! Job system statistics.
//!
//! Totals are plain relaxed atomics shared by every worker generation of a
//! job system. A [`Statistics`] snapshot reads them together with the queue
//! depths, locking each queue briefly, so individual fields are consistent at
//! the moment they were read but the snapshot as a whole is not atomic.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::worker::WorkerPool;

/// Lifetime job totals of a job system.
#[derive(Debug, Default)]
pub(crate) struct Totals {
    submitted: AtomicUsize,
    completed: AtomicUsize,
    panicked: AtomicUsize,
}

impl Totals {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn submitted(&self) -> usize {
        self.submitted.load(Ordering::Relaxed)
    }

    pub(crate) fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub(crate) fn panicked(&self) -> usize {
        self.panicked.load(Ordering::Relaxed)
    }
}

/// Snapshot of the job system at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    /// Jobs accepted since the job system was created.
    pub total_jobs_submitted: usize,
    /// Jobs that finished executing (including ones that panicked).
    pub total_jobs_completed: usize,
    /// Jobs whose body panicked.
    pub total_jobs_panicked: usize,
    /// Depth of the shared queue.
    pub jobs_in_global_queue: usize,
    /// Sum of all local queue depths.
    pub jobs_in_local_queues: usize,
    /// Local queue depth of each worker.
    pub jobs_per_worker: Vec<usize>,
    /// Jobs each worker has executed in the current generation.
    pub jobs_processed_per_worker: Vec<usize>,
}

impl Statistics {
    pub(crate) fn capture(totals: &Totals, pool: Option<&WorkerPool>) -> Self {
        let mut stats = Statistics {
            total_jobs_submitted: totals.submitted(),
            total_jobs_completed: totals.completed(),
            total_jobs_panicked: totals.panicked(),
            ..Statistics::default()
        };

        if let Some(pool) = pool {
            stats.jobs_in_global_queue = pool.global_queue_len();
            for worker in pool.workers() {
                let depth = worker.len();
                stats.jobs_per_worker.push(depth);
                stats.jobs_in_local_queues += depth;
                stats.jobs_processed_per_worker.push(worker.processed());
            }
        }

        stats
    }

    /// Jobs sitting in any queue.
    pub fn pending_jobs(&self) -> usize {
        self.jobs_in_global_queue + self.jobs_in_local_queues
    }

    /// Approximates jobs that were dequeued but have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.total_jobs_submitted
            .saturating_sub(self.total_jobs_completed)
            .saturating_sub(self.pending_jobs())
    }
}
