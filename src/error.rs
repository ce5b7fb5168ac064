//! Error types for the job system.

use std::io;

use thiserror::Error;

/// Errors reported by the job system.
#[derive(Debug, Error)]
pub enum JobSystemError {
    /// Work was submitted before `initialize` or after `shutdown`.
    #[error("job system is not initialized")]
    NotInitialized,

    /// A worker thread could not be created during `initialize`.
    #[error("failed to spawn worker thread {index}")]
    SpawnFailed {
        index: usize,
        #[source]
        source: io::Error,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The configuration file is not valid TOML for [`JobSystemConfig`](crate::JobSystemConfig).
    #[error("failed to parse configuration")]
    ConfigParse(#[from] toml::de::Error),

    /// The configuration file could not be read.
    #[error("failed to read configuration")]
    ConfigIo(#[from] io::Error),
}
