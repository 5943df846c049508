//! Error types for catrack-core.

use thiserror::Error;

/// Result type alias for catrack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for catrack operations.
///
/// Data-quality problems inside a timeslice (bogus timestamps, empty input)
/// are never reported through this type; they are logged and skipped.
#[derive(Error, Debug)]
pub enum Error {
    /// The finder was configured with no worker threads.
    #[error("invalid thread count: {0} (at least one thread is required)")]
    InvalidThreadCount(usize),

    /// The worker pool could not be created.
    #[error("thread pool error: {0}")]
    ThreadPool(String),

    /// Inconsistent input data (stream boundaries, keys, stations).
    #[error("invalid input data: {0}")]
    InvalidInput(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}
