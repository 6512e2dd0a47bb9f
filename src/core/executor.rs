//! Job execution trait and per-attempt error classification.

use async_trait::async_trait;
use thiserror::Error;

use super::JobId;

/// Failure of a single executor attempt.
///
/// The variant tells the scheduler what to do with the leased resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// The job failed but the resource is still usable; the next attempt
    /// reuses it.
    #[error("job failed: {0}")]
    Failed(String),
    /// The resource is broken. It is returned to the pool as unhealthy and
    /// the next attempt runs on a freshly acquired one.
    #[error("resource lost: {0}")]
    ResourceLost(String),
}

impl JobError {
    /// Failure that keeps the resource.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Failure that discards the resource.
    pub fn resource_lost(message: impl Into<String>) -> Self {
        Self::ResourceLost(message.into())
    }

    /// Whether the resource must be given back as unhealthy.
    #[must_use]
    pub const fn is_resource_lost(&self) -> bool {
        matches!(self, Self::ResourceLost(_))
    }
}

/// Runs one job on an exclusively leased resource.
///
/// Called from a dedicated worker thread with its own single-threaded tokio
/// runtime, so blocking or CPU-bound work does not stall other workers.
///
/// A job may be attempted more than once, and a process crash between a
/// successful attempt and the progress save means the job runs again on the
/// next run. Implementations must therefore be idempotent.
///
/// A panic inside `execute` is caught and treated as
/// [`JobError::ResourceLost`].
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_harvest::core::{JobError, JobExecutor, JobId};
///
/// #[derive(Clone)]
/// struct Download;
///
/// #[async_trait]
/// impl JobExecutor<BrowserSession, usize> for Download {
///     async fn execute(&self, job: &JobId, session: &mut BrowserSession) -> Result<usize, JobError> {
///         session
///             .fetch_statement(job.as_str())
///             .await
///             .map_err(|e| JobError::failed(e.to_string()))
///     }
/// }
/// ```
#[async_trait]
pub trait JobExecutor<R, P>: Send + Sync + Clone + 'static
where
    R: Send + 'static,
    P: Send + 'static,
{
    /// Execute one attempt of `job` on `resource`.
    async fn execute(&self, job: &JobId, resource: &mut R) -> Result<P, JobError>;
}
