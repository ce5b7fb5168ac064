//! Countdown used to detect completion of a batch of jobs.

use std::sync::Arc;
use std::sync::atomic::{AtomicIsize, Ordering};

/// A shared countdown for tracking batch completion.
///
/// Cloning a `JobCounter` shares the same count. Every job of a batch holds a
/// clone and decrements it exactly once when it finishes; the caller polls
/// [`is_complete`](JobCounter::is_complete) or waits through the job system.
/// The count never increases.
#[derive(Clone, Debug)]
pub struct JobCounter {
    remaining: Arc<AtomicIsize>,
}

impl JobCounter {
    /// Creates a counter expecting `jobs` completions.
    pub fn new(jobs: usize) -> Self {
        JobCounter {
            remaining: Arc::new(AtomicIsize::new(
                isize::try_from(jobs).unwrap_or(isize::MAX),
            )),
        }
    }

    /// Records one completion.
    ///
    /// Release ordering makes the finished job's writes visible to whichever
    /// thread observes the counter as complete.
    pub fn decrement(&self) {
        self.remaining.fetch_sub(1, Ordering::Release);
    }

    /// Number of completions still outstanding (may be negative if
    /// decremented more often than it was sized for).
    pub fn remaining(&self) -> isize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Checks if every tracked job has finished.
    pub fn is_complete(&self) -> bool {
        self.remaining() <= 0
    }

    /// Arms a guard that decrements this counter when dropped, including
    /// during unwinding.
    pub(crate) fn completion_guard(&self) -> CompletionGuard<'_> {
        CompletionGuard { counter: self }
    }
}

/// Decrements its counter on drop.
pub(crate) struct CompletionGuard<'a> {
    counter: &'a JobCounter,
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        self.counter.decrement();
    }
}
