//! Worker thread implementation.
//!
//! A [`WorkerPool`] is one generation of running workers: a local FIFO queue
//! per worker, the shared fallback queue, the condition variable idle workers
//! sleep on, and the map from thread identity to worker index. Every queue has
//! its own mutex, held only for a single push or pop; no lock is held while a
//! job runs.
//!
//! Workers look for work in a fixed order: their own local queue, then the
//! shared queue, then the other workers' local queues (stealing).

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crossbeam::utils::CachePadded;
use tracing::{debug, error};

use crate::config::JobSystemConfig;
use crate::error::JobSystemError;
use crate::job::Job;
use crate::stats::Totals;

/// Locks a scheduler mutex. No scheduler lock is held while user code runs,
/// so a poisoned lock still guards consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-worker bookkeeping.
#[derive(Debug)]
pub(crate) struct WorkerState {
    queue: Mutex<VecDeque<Job>>,
    processed: AtomicUsize,
    thread_id: OnceLock<ThreadId>,
}

impl WorkerState {
    fn new() -> Self {
        WorkerState {
            queue: Mutex::new(VecDeque::new()),
            processed: AtomicUsize::new(0),
            thread_id: OnceLock::new(),
        }
    }

    pub(crate) fn push(&self, job: Job) {
        lock(&self.queue).push_back(job);
    }

    pub(crate) fn pop(&self) -> Option<Job> {
        lock(&self.queue).pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.queue).len()
    }

    pub(crate) fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    fn drain(&self) -> usize {
        let jobs: Vec<Job> = lock(&self.queue).drain(..).collect();
        jobs.len()
    }
}

/// Shared state of one generation of worker threads.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    workers: Vec<CachePadded<WorkerState>>,
    global_queue: Mutex<VecDeque<Job>>,
    wake: Condvar,
    shutdown: AtomicBool,
    thread_index: Mutex<HashMap<ThreadId, usize>>,
    totals: Arc<Totals>,
    idle_wait: Duration,
}

impl WorkerPool {
    /// Creates the pool state without spawning any threads.
    pub(crate) fn new(num_workers: usize, idle_wait: Duration, totals: Arc<Totals>) -> Self {
        WorkerPool {
            workers: (0..num_workers)
                .map(|_| CachePadded::new(WorkerState::new()))
                .collect(),
            global_queue: Mutex::new(VecDeque::new()),
            wake: Condvar::new(),
            shutdown: AtomicBool::new(false),
            thread_index: Mutex::new(HashMap::new()),
            totals,
            idle_wait,
        }
    }

    /// Creates the pool and spawns one worker thread per slot.
    ///
    /// If any spawn fails the workers started so far are stopped and joined
    /// before the error is returned.
    pub(crate) fn start(
        num_workers: usize,
        config: &JobSystemConfig,
        totals: Arc<Totals>,
    ) -> Result<(Arc<WorkerPool>, Vec<Worker>), JobSystemError> {
        let pool = Arc::new(WorkerPool::new(num_workers, config.idle_wait(), totals));
        let mut workers = Vec::with_capacity(num_workers);

        for id in 0..num_workers {
            match Worker::spawn(id, Arc::clone(&pool), config) {
                Ok(worker) => {
                    pool.register_thread(id, worker.thread_id());
                    workers.push(worker);
                }
                Err(source) => {
                    error!(worker = id, error = %source, "failed to spawn worker thread");
                    pool.signal_shutdown();
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(JobSystemError::SpawnFailed { index: id, source });
                }
            }
        }

        Ok((pool, workers))
    }

    pub(crate) fn size(&self) -> usize {
        self.workers.len()
    }

    pub(crate) fn workers(&self) -> impl Iterator<Item = &WorkerState> {
        self.workers.iter().map(|w| &**w)
    }

    pub(crate) fn totals(&self) -> &Totals {
        &self.totals
    }

    /// Pushes onto the shared queue and wakes one idle worker.
    pub(crate) fn push_global(&self, job: Job) {
        lock(&self.global_queue).push_back(job);
        self.wake.notify_one();
    }

    /// Pushes onto one worker's local queue. `worker_id` must be in range.
    pub(crate) fn push_local(&self, worker_id: usize, job: Job) {
        self.workers[worker_id].push(job);
        self.wake.notify_one();
    }

    pub(crate) fn pop_global(&self) -> Option<Job> {
        lock(&self.global_queue).pop_front()
    }

    pub(crate) fn global_queue_len(&self) -> usize {
        lock(&self.global_queue).len()
    }

    /// Obtains the next job for `worker_id`: local queue, shared queue, then steal.
    pub(crate) fn try_get_job(&self, worker_id: usize) -> Option<Job> {
        self.workers[worker_id]
            .pop()
            .or_else(|| self.pop_global())
            .or_else(|| self.try_steal_job(worker_id))
    }

    /// Takes the oldest job of the first non-empty victim, scanning every
    /// other worker once starting just after the thief.
    pub(crate) fn try_steal_job(&self, thief_id: usize) -> Option<Job> {
        let count = self.workers.len();
        if count == 0 {
            return None;
        }

        let start = (thief_id + 1) % count;
        (0..count)
            .map(|i| (start + i) % count)
            .filter(|&victim| victim != thief_id)
            .find_map(|victim| self.workers[victim].pop())
    }

    pub(crate) fn register_thread(&self, worker_id: usize, thread_id: ThreadId) {
        let _ = self.workers[worker_id].thread_id.set(thread_id);
        lock(&self.thread_index).insert(thread_id, worker_id);
    }

    pub(crate) fn clear_thread_index(&self) {
        lock(&self.thread_index).clear();
    }

    /// Worker index of the calling thread, if it belongs to this pool.
    pub(crate) fn current_worker_id(&self) -> Option<usize> {
        lock(&self.thread_index)
            .get(&thread::current().id())
            .copied()
    }

    /// Runs a job and updates the completion counters. `worker_id` is the
    /// executing worker, or `None` for a thread outside the pool.
    pub(crate) fn run_job(&self, job: Job, worker_id: Option<usize>) {
        if !job.execute_caught() {
            self.totals.record_panicked();
            error!(worker = ?worker_id, "job panicked");
        }

        self.totals.record_completed();
        if let Some(id) = worker_id {
            self.workers[id].processed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Main execution loop of worker `worker_id`.
    fn run_loop(&self, worker_id: usize) {
        debug!(worker = worker_id, "worker started");

        while !self.is_shutting_down() {
            match self.try_get_job(worker_id) {
                Some(job) => self.run_job(job, Some(worker_id)),
                None => self.wait_for_work(),
            }
        }

        debug!(
            worker = worker_id,
            processed = self.workers[worker_id].processed(),
            "worker stopped"
        );
    }

    /// Sleeps until the shared queue has work, shutdown is signalled, or the
    /// idle wait elapses. The bound covers wakeups missed by local pushes.
    fn wait_for_work(&self) {
        let queue = lock(&self.global_queue);
        let _ = self
            .wake
            .wait_timeout_while(queue, self.idle_wait, |queue| {
                queue.is_empty() && !self.is_shutting_down()
            })
            .unwrap_or_else(PoisonError::into_inner);
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Tells every worker to exit its loop.
    pub(crate) fn signal_shutdown(&self) {
        {
            // Set under the queue lock so no worker can check the predicate
            // and then miss the notification.
            let _queue = lock(&self.global_queue);
            self.shutdown.store(true, Ordering::Release);
        }
        self.wake.notify_all();
    }

    /// Discards every queued job. Returns how many were dropped.
    pub(crate) fn discard_pending(&self) -> usize {
        let global: Vec<Job> = lock(&self.global_queue).drain(..).collect();
        let local: usize = self.workers.iter().map(|w| w.drain()).sum();
        global.len() + local
    }
}

/// Handle to a running worker thread.
#[derive(Debug)]
pub(crate) struct Worker {
    id: usize,
    thread_id: ThreadId,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(id: usize, pool: Arc<WorkerPool>, config: &JobSystemConfig) -> io::Result<Self> {
        let mut builder =
            thread::Builder::new().name(format!("{}-{}", config.thread_name_prefix, id));
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let handle = builder.spawn(move || pool.run_loop(id))?;

        Ok(Worker {
            id,
            thread_id: handle.thread().id(),
            handle: Some(handle),
        })
    }

    /// Returns the worker's ID.
    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Waits for the worker thread to finish.
    pub(crate) fn join(mut self) -> thread::Result<()> {
        match self.handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }
}
