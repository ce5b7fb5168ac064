//! High-level job system interface.
//!
//! The [`JobSystem`] is the entry point for scheduling work. It owns the
//! current generation of worker threads, created by
//! [`initialize`](JobSystem::initialize) and torn down by
//! [`shutdown`](JobSystem::shutdown), and provides submission, waiting and
//! statistics on top of it.
//!
//! `JobSystem` is a cheap handle: clones share the same scheduler, and jobs
//! that need nested parallelism capture a clone. Dropping the last handle
//! shuts the scheduler down.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::config::{JobSystemConfig, detect_hardware_concurrency, resolve_thread_count};
use crate::counter::JobCounter;
use crate::error::JobSystemError;
use crate::job::{Job, run_caught};
use crate::stats::{Statistics, Totals};
use crate::worker::{Worker, WorkerPool};

/// Outcome of a single attempt to run queued work on the calling thread.
enum Progress {
    Executed,
    Idle,
    Stopped,
}

/// A running generation of workers.
struct Runtime {
    pool: Arc<WorkerPool>,
    workers: Vec<Worker>,
}

struct Inner {
    config: JobSystemConfig,
    probe: fn() -> usize,
    totals: Arc<Totals>,
    runtime: RwLock<Option<Runtime>>,
}

impl Inner {
    fn read(&self) -> RwLockReadGuard<'_, Option<Runtime>> {
        self.runtime.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Runtime>> {
        self.runtime.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn shutdown(&self) {
        let Some(runtime) = self.write().take() else {
            return;
        };

        info!("shutting down job system");
        runtime.pool.signal_shutdown();

        let current = thread::current().id();
        for worker in runtime.workers {
            let worker_id = worker.id();
            if worker.thread_id() == current {
                warn!(
                    worker = worker_id,
                    "shutdown requested from a worker thread; it exits after its current job"
                );
                continue;
            }
            if worker.join().is_err() {
                error!(worker = worker_id, "worker thread panicked");
            }
        }

        runtime.pool.clear_thread_index();
        let discarded = runtime.pool.discard_pending();

        info!(
            submitted = self.totals.submitted(),
            completed = self.totals.completed(),
            discarded,
            "job system shut down"
        );
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Work-stealing job scheduler.
///
/// # Example
///
/// ```
/// use jobsys::JobSystem;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let jobs = JobSystem::new();
/// jobs.initialize(4).unwrap();
///
/// let sum = Arc::new(AtomicUsize::new(0));
/// let work: Vec<_> = (1..=10)
///     .map(|i| {
///         let sum = sum.clone();
///         move || {
///             sum.fetch_add(i, Ordering::Relaxed);
///         }
///     })
///     .collect();
///
/// let counter = jobs.submit_batch(work).unwrap();
/// jobs.wait_for_counter(counter.as_ref());
/// assert_eq!(sum.load(Ordering::Relaxed), 55);
///
/// jobs.shutdown();
/// ```
#[derive(Clone)]
pub struct JobSystem {
    inner: Arc<Inner>,
}

impl JobSystem {
    /// Creates an uninitialized job system with the default configuration.
    pub fn new() -> Self {
        Self::with_config(JobSystemConfig::default())
    }

    /// Creates an uninitialized job system with a custom configuration.
    pub fn with_config(config: JobSystemConfig) -> Self {
        Self::with_concurrency_probe(config, detect_hardware_concurrency)
    }

    /// Creates an uninitialized job system that asks `probe` for the host's
    /// hardware concurrency when no thread count is given. A probe answer of
    /// 0 means "unknown".
    pub fn with_concurrency_probe(config: JobSystemConfig, probe: fn() -> usize) -> Self {
        JobSystem {
            inner: Arc::new(Inner {
                config,
                probe,
                totals: Arc::new(Totals::default()),
                runtime: RwLock::new(None),
            }),
        }
    }

    /// Returns the configuration this job system was created with.
    pub fn config(&self) -> &JobSystemConfig {
        &self.inner.config
    }

    /// Spawns the worker threads.
    ///
    /// `num_threads == 0` uses the configured thread count, and if that is 0
    /// too, the detected hardware concurrency (4 when detection fails).
    /// Calling this on an initialized job system logs a warning and does
    /// nothing. A failure to spawn any worker is returned as
    /// [`JobSystemError::SpawnFailed`] and leaves the job system uninitialized.
    pub fn initialize(&self, num_threads: usize) -> Result<(), JobSystemError> {
        let mut runtime = self.inner.write();
        if runtime.is_some() {
            warn!("job system already initialized");
            return Ok(());
        }

        self.inner.config.validate()?;

        let requested = if num_threads == 0 {
            self.inner.config.num_threads
        } else {
            num_threads
        };
        let count = resolve_thread_count(requested, self.inner.probe);

        let (pool, workers) =
            WorkerPool::start(count, &self.inner.config, Arc::clone(&self.inner.totals))?;
        *runtime = Some(Runtime { pool, workers });

        info!(workers = count, "job system initialized");
        Ok(())
    }

    /// Stops and joins every worker.
    ///
    /// Jobs still queued are discarded without running; only the aggregate
    /// totals are logged. Wait on outstanding counters first if every job
    /// must run. Does nothing if the job system is not initialized.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    /// Checks if the worker threads are running.
    pub fn is_initialized(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Returns the number of worker threads, or 0 when not initialized.
    pub fn worker_count(&self) -> usize {
        self.pool().map_or(0, |pool| pool.size())
    }

    /// Returns the worker index of the calling thread, or `None` if it is not
    /// one of this job system's workers.
    pub fn current_worker_id(&self) -> Option<usize> {
        self.pool().and_then(|pool| pool.current_worker_id())
    }

    /// Submits a job to the shared queue and wakes one idle worker.
    ///
    /// FIFO order holds among jobs of the shared queue only.
    pub fn submit<F>(&self, work: F) -> Result<(), JobSystemError>
    where
        F: FnOnce() + Send + 'static,
    {
        let pool = self.require_pool()?;
        Self::enqueue_global(&pool, Job::new(work));
        Ok(())
    }

    /// Submits a job directly to one worker's local queue.
    ///
    /// An out-of-range `worker_id` logs a warning and falls back to
    /// [`submit`](JobSystem::submit).
    pub fn submit_to_worker<F>(&self, work: F, worker_id: usize) -> Result<(), JobSystemError>
    where
        F: FnOnce() + Send + 'static,
    {
        let pool = self.require_pool()?;

        if worker_id >= pool.size() {
            warn!(
                worker = worker_id,
                workers = pool.size(),
                "invalid worker id, submitting to global queue"
            );
            Self::enqueue_global(&pool, Job::new(work));
            return Ok(());
        }

        pool.totals().record_submitted();
        pool.push_local(worker_id, Job::new(work));
        Ok(())
    }

    /// Submits every job to the shared queue and returns a counter that
    /// completes once all of them have run.
    ///
    /// Returns `Ok(None)` for an empty batch. A batch is either enqueued as a
    /// whole or rejected as a whole.
    pub fn submit_batch<I, F>(&self, jobs: I) -> Result<Option<JobCounter>, JobSystemError>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() + Send + 'static,
    {
        let jobs: Vec<F> = jobs.into_iter().collect();
        if jobs.is_empty() {
            return Ok(None);
        }

        let pool = self.require_pool()?;
        Ok(Some(Self::enqueue_batch(&pool, jobs)))
    }

    /// Groups contiguous jobs into chunks and submits one job per chunk.
    ///
    /// Each chunk runs its members sequentially in input order; chunks run in
    /// any order. A panicking member is logged and counted like a panicking
    /// job, and the rest of its chunk still runs. `chunk_size == 0` picks
    /// `max(1, len / (workers * 2))`, capped at the configured maximum.
    pub fn submit_batch_chunked<I, F>(
        &self,
        jobs: I,
        chunk_size: usize,
    ) -> Result<Option<JobCounter>, JobSystemError>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() + Send + 'static,
    {
        let jobs: Vec<F> = jobs.into_iter().collect();
        if jobs.is_empty() {
            return Ok(None);
        }

        let pool = self.require_pool()?;
        let chunk_size = match chunk_size {
            0 => auto_chunk_size(jobs.len(), pool.size(), self.inner.config.max_chunk_size),
            n => n,
        };

        let mut chunks = Vec::with_capacity(jobs.len().div_ceil(chunk_size));
        let mut remaining = jobs.into_iter().peekable();
        while remaining.peek().is_some() {
            let chunk: Vec<F> = remaining.by_ref().take(chunk_size).collect();
            let totals = Arc::clone(&self.inner.totals);
            chunks.push(move || {
                for work in chunk {
                    if run_caught(work).is_err() {
                        totals.record_panicked();
                        error!("chunked job panicked");
                    }
                }
            });
        }

        Ok(Some(Self::enqueue_batch(&pool, chunks)))
    }

    /// Blocks until `counter` completes, running queued jobs on the calling
    /// thread in the meantime. A `None` counter is already complete.
    ///
    /// Because the waiting thread keeps draining work, a job may wait on a
    /// sub-batch it submitted without deadlocking its worker. Gives up with a
    /// warning if the job system is shut down while waiting.
    pub fn wait_for_counter<'a>(&self, counter: impl Into<Option<&'a JobCounter>>) {
        let Some(counter) = counter.into() else {
            return;
        };

        while !counter.is_complete() {
            match self.try_execute_next() {
                Progress::Executed => {}
                Progress::Idle => thread::yield_now(),
                Progress::Stopped => {
                    warn!("stopped waiting on counter: job system is not initialized");
                    return;
                }
            }
        }
    }

    /// Like [`wait_for_counter`](JobSystem::wait_for_counter) but gives up
    /// after `timeout`. Returns `true` if the counter completed.
    ///
    /// Timing out only abandons the wait; the jobs keep running and still
    /// decrement the counter later.
    pub fn wait_for_counter_timeout<'a>(
        &self,
        counter: impl Into<Option<&'a JobCounter>>,
        timeout: Duration,
    ) -> bool {
        let Some(counter) = counter.into() else {
            return true;
        };

        let start = Instant::now();
        while !counter.is_complete() {
            if start.elapsed() > timeout {
                return false;
            }

            match self.try_execute_next() {
                Progress::Executed => {}
                Progress::Idle => thread::yield_now(),
                Progress::Stopped => {
                    warn!("stopped waiting on counter: job system is not initialized");
                    return counter.is_complete();
                }
            }
        }

        true
    }

    /// Runs queued jobs on the calling thread until `counter` completes or
    /// no job is immediately available.
    pub fn help_with<'a>(&self, counter: impl Into<Option<&'a JobCounter>>) {
        let Some(counter) = counter.into() else {
            return;
        };

        while !counter.is_complete() {
            if !self.execute_next_job() {
                break;
            }
        }
    }

    /// Runs a single queued job on the calling thread.
    ///
    /// On a worker thread this looks at the worker's own queue first, then
    /// the shared queue, then the other workers. Any other thread only polls
    /// the shared queue, so it never contends on the workers' local locks.
    /// Returns whether a job was executed.
    pub fn execute_next_job(&self) -> bool {
        matches!(self.try_execute_next(), Progress::Executed)
    }

    /// Returns a snapshot of job totals and queue depths.
    pub fn statistics(&self) -> Statistics {
        let pool = self.pool();
        Statistics::capture(&self.inner.totals, pool.as_deref())
    }

    fn try_execute_next(&self) -> Progress {
        let Some(pool) = self.pool() else {
            return Progress::Stopped;
        };

        let (job, worker_id) = match pool.current_worker_id() {
            Some(id) => (pool.try_get_job(id), Some(id)),
            None => (pool.pop_global(), None),
        };

        match job {
            Some(job) => {
                pool.run_job(job, worker_id);
                Progress::Executed
            }
            None => Progress::Idle,
        }
    }

    fn pool(&self) -> Option<Arc<WorkerPool>> {
        self.inner
            .read()
            .as_ref()
            .map(|runtime| Arc::clone(&runtime.pool))
    }

    fn require_pool(&self) -> Result<Arc<WorkerPool>, JobSystemError> {
        match self.pool() {
            Some(pool) if !pool.is_shutting_down() => Ok(pool),
            _ => {
                error!("cannot submit job - job system not initialized");
                Err(JobSystemError::NotInitialized)
            }
        }
    }

    fn enqueue_global(pool: &WorkerPool, job: Job) {
        pool.totals().record_submitted();
        pool.push_global(job);
    }

    fn enqueue_batch<F>(pool: &WorkerPool, jobs: Vec<F>) -> JobCounter
    where
        F: FnOnce() + Send + 'static,
    {
        let counter = JobCounter::new(jobs.len());

        for work in jobs {
            let counter = counter.clone();
            Self::enqueue_global(
                pool,
                Job::new(move || {
                    let _done = counter.completion_guard();
                    work();
                }),
            );
        }

        counter
    }
}

impl Default for JobSystem {
    fn default() -> Self {
        JobSystem::new()
    }
}

impl fmt::Debug for JobSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSystem")
            .field("initialized", &self.is_initialized())
            .field("workers", &self.worker_count())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Automatic chunk size for `submit_batch_chunked`.
pub(crate) fn auto_chunk_size(jobs: usize, workers: usize, max_chunk_size: usize) -> usize {
    (jobs / (workers.max(1) * 2)).clamp(1, max_chunk_size.max(1))
}
