//! Logging init for binaries and tests.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the application.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,jobsys=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize structured logging to stderr. The filter is read from
/// `RUST_LOG`, defaulting to `info,jobsys=debug`.
///
/// Panics if a global subscriber is already installed.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

/// Installs a subscriber that writes through the test harness's captured
/// output. Safe to call from every test; only the first call wins.
pub fn try_init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_test_writer()
        .try_init();
}
