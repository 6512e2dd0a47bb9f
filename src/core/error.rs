//! Error types for run-level scheduler operations.

use thiserror::Error;

use super::resource_pool::PoolError;

/// Errors that abort a whole run.
///
/// Per-job failures never show up here; they are reported as data in the
/// [`RunReport`](super::RunReport) and the progress store.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The resource pool could not be initialized.
    #[error("resource pool initialization failed: {0}")]
    PoolInit(#[source] PoolError),
    /// Configuration rejected before any resource was created.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Worker infrastructure failure (thread spawn, runtime construction).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
