//! # jobsys - Work-Stealing Job Scheduler
//!
//! A generic parallel-task engine that spreads short-lived jobs across a
//! fixed pool of worker threads. Each worker owns a local FIFO queue; a
//! shared fallback queue takes everything not aimed at a specific worker,
//! and idle workers steal from each other before going to sleep.
//!
//! ## Architecture
//!
//! - **Jobs**: type-erased `FnOnce()` closures, executed exactly once or
//!   discarded at shutdown
//! - **Counters**: shared countdowns that tell a caller when a batch has finished
//! - **Workers**: OS threads that take work from their local queue, then the
//!   shared queue, then by stealing from other workers
//! - **Cooperative waiting**: a thread waiting on a counter runs queued jobs
//!   itself, so jobs may wait on sub-batches without deadlocking the pool
//!
//! ## Example
//!
//! ```
//! use jobsys::JobSystem;
//!
//! let job_system = JobSystem::new();
//! job_system.initialize(4).unwrap();
//!
//! let counter = job_system
//!     .submit_batch((0..8).map(|i| move || println!("job {i}")))
//!     .unwrap();
//! job_system.wait_for_counter(counter.as_ref());
//!
//! job_system.shutdown();
//! ```

pub mod config;
pub mod counter;
pub mod error;
mod job;
pub mod job_system;
pub mod logging;
pub mod parallel;
pub mod stats;
mod worker;

pub use config::JobSystemConfig;
pub use counter::JobCounter;
pub use error::JobSystemError;
pub use job_system::JobSystem;
pub use parallel::{parallel_for, parallel_for_indexed};
pub use stats::Statistics;

#[cfg(test)]
mod tests;
