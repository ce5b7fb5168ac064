//! Parallel-for helpers built on [`JobSystem`].
//!
//! Both helpers split `[start, end)` into contiguous chunks, submit one job
//! per chunk as a batch and block the calling thread (helping with queued
//! work) until every chunk has run. Without an initialized job system they
//! run the loop sequentially on the calling thread.
//!
//! A panic in `func` does not stop the other indices. Every index still runs,
//! and the first panic is resumed on the calling thread once the whole range
//! is done.

use std::any::Any;
use std::ops::Range;
use std::panic;
use std::sync::{Arc, Mutex};

use crate::job::run_caught;
use crate::job_system::JobSystem;
use crate::worker::lock;

/// Holds the first panic raised by any index of a parallel loop.
#[derive(Default)]
struct FirstPanic {
    payload: Mutex<Option<Box<dyn Any + Send>>>,
}

impl FirstPanic {
    fn run<F: FnOnce()>(&self, work: F) {
        if let Err(payload) = run_caught(work) {
            let mut slot = lock(&self.payload);
            if slot.is_none() {
                *slot = Some(payload);
            }
        }
    }

    /// Re-raises the recorded panic, if any, on the calling thread.
    fn resume(&self) {
        let payload = lock(&self.payload).take();
        if let Some(payload) = payload {
            panic::resume_unwind(payload);
        }
    }
}

/// Runs `func(i)` for every `i` in `range`.
///
/// `chunk_size == 0` picks `max(1, len / (workers * 4))`.
///
/// # Panics
///
/// Resumes the first panic raised by `func`, after every index has run.
///
/// ```
/// use jobsys::{JobSystem, parallel::parallel_for};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let jobs = JobSystem::new();
/// jobs.initialize(2).unwrap();
///
/// let total = Arc::new(AtomicUsize::new(0));
/// let sink = total.clone();
/// parallel_for(Some(&jobs), 0..100, 0, move |i| {
///     sink.fetch_add(i, Ordering::Relaxed);
/// });
/// assert_eq!(total.load(Ordering::Relaxed), 4950);
/// ```
pub fn parallel_for<F>(system: Option<&JobSystem>, range: Range<usize>, chunk_size: usize, func: F)
where
    F: Fn(usize) + Send + Sync + 'static,
{
    let system = match system {
        Some(system) if system.is_initialized() => system,
        _ => {
            range.for_each(func);
            return;
        }
    };
    if range.is_empty() {
        return;
    }

    let chunk_size = resolve_chunk_size(range.len(), system.worker_count(), chunk_size);
    let func = Arc::new(func);
    let first_panic = Arc::new(FirstPanic::default());
    let jobs: Vec<_> = chunks(range.clone(), chunk_size)
        .map(|chunk| {
            let func = Arc::clone(&func);
            let first_panic = Arc::clone(&first_panic);
            move || chunk.for_each(|i| first_panic.run(|| func(i)))
        })
        .collect();

    match system.submit_batch(jobs) {
        Ok(counter) => {
            system.wait_for_counter(counter.as_ref());
            first_panic.resume();
        }
        // Shut down between the check and the submission.
        Err(_) => range.for_each(|i| func(i)),
    }
}

/// Runs `func(i, worker)` for every `i` in `range`, where `worker` is the
/// index of the worker executing the chunk, or 0 on a thread outside the
/// pool. Useful for indexing per-worker scratch storage.
pub fn parallel_for_indexed<F>(
    system: Option<&JobSystem>,
    range: Range<usize>,
    chunk_size: usize,
    func: F,
) where
    F: Fn(usize, usize) + Send + Sync + 'static,
{
    let system = match system {
        Some(system) if system.is_initialized() => system,
        _ => {
            range.for_each(|i| func(i, 0));
            return;
        }
    };
    if range.is_empty() {
        return;
    }

    let chunk_size = resolve_chunk_size(range.len(), system.worker_count(), chunk_size);
    let func = Arc::new(func);
    let first_panic = Arc::new(FirstPanic::default());
    let jobs: Vec<_> = chunks(range.clone(), chunk_size)
        .map(|chunk| {
            let func = Arc::clone(&func);
            let first_panic = Arc::clone(&first_panic);
            let handle = system.clone();
            move || {
                let worker = handle.current_worker_id().unwrap_or(0);
                chunk.for_each(|i| first_panic.run(|| func(i, worker)));
            }
        })
        .collect();

    match system.submit_batch(jobs) {
        Ok(counter) => {
            system.wait_for_counter(counter.as_ref());
            first_panic.resume();
        }
        Err(_) => range.for_each(|i| func(i, 0)),
    }
}

fn resolve_chunk_size(count: usize, workers: usize, requested: usize) -> usize {
    match requested {
        0 => (count / (workers.max(1) * 4)).max(1),
        n => n,
    }
}

fn chunks(range: Range<usize>, chunk_size: usize) -> impl Iterator<Item = Range<usize>> {
    let end = range.end;
    range
        .step_by(chunk_size)
        .map(move |start| start..(start + chunk_size).min(end))
}
