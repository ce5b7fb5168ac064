//! Scheduler configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::JobSystemError;

/// Configuration for the job system.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSystemConfig {
    /// Worker threads to spawn when `initialize(0)` is called. 0 = detect
    /// the host's hardware concurrency.
    pub num_threads: usize,
    /// Upper bound on how long an idle worker sleeps before rechecking its
    /// queues and the shutdown flag, in milliseconds. Default: 10.
    pub idle_wait_ms: u64,
    /// Cap on the automatic chunk size of `submit_batch_chunked`. Default: 64.
    pub max_chunk_size: usize,
    /// Worker threads are named `<prefix>-<index>`.
    pub thread_name_prefix: String,
    /// Stack size for each worker thread in bytes. `None` uses the platform default.
    pub stack_size: Option<usize>,
}

impl Default for JobSystemConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            idle_wait_ms: 10,
            max_chunk_size: 64,
            thread_name_prefix: "job-worker".to_string(),
            stack_size: None,
        }
    }
}

impl JobSystemConfig {
    /// Parses and validates a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, JobSystemError> {
        let config: JobSystemConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, JobSystemError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Rejects values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), JobSystemError> {
        if self.idle_wait_ms == 0 {
            return Err(JobSystemError::Config(
                "idle_wait_ms must be at least 1".to_string(),
            ));
        }
        if self.max_chunk_size == 0 {
            return Err(JobSystemError::Config(
                "max_chunk_size must be at least 1".to_string(),
            ));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(JobSystemError::Config(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

/// Detects the host's hardware concurrency, returning 0 when it cannot be
/// determined.
pub fn detect_hardware_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(0)
}

/// Resolves a requested worker count: non-zero requests are taken as is,
/// 0 asks `probe`, and a probe answer of 0 falls back to 4.
pub(crate) fn resolve_thread_count(requested: usize, probe: fn() -> usize) -> usize {
    const FALLBACK_THREADS: usize = 4;

    if requested != 0 {
        return requested;
    }
    match probe() {
        0 => FALLBACK_THREADS,
        n => n,
    }
}
