//! Job definitions and execution logic.
//!
//! A job is a type-erased, zero-argument closure with no return value. Once
//! handed to the scheduler it is owned by exactly one queue at a time and is
//! either executed once or dropped unexecuted when the scheduler shuts down.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// A unit of work to be executed by the job system.
pub(crate) struct Job {
    work: Box<dyn FnOnce() + Send + 'static>,
}

impl Job {
    /// Creates a new job from the given work function.
    pub(crate) fn new<F>(work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Job {
            work: Box::new(work),
        }
    }

    /// Executes the job on the calling thread, consuming it.
    pub(crate) fn execute(self) {
        (self.work)();
    }

    /// Executes the job, containing any panic that escapes it.
    ///
    /// Returns `false` if the job panicked.
    pub(crate) fn execute_caught(self) -> bool {
        run_caught(|| self.execute()).is_ok()
    }
}

/// Runs `work` on the calling thread, returning the panic payload if it
/// panicked.
pub(crate) fn run_caught<F>(work: F) -> Result<(), Box<dyn Any + Send>>
where
    F: FnOnce(),
{
    panic::catch_unwind(AssertUnwindSafe(work))
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").finish_non_exhaustive()
    }
}
