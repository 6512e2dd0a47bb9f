//! Core orchestration: resource pool, progress store and scheduler.

pub mod backoff;
pub mod error;
pub mod executor;
pub mod job;
pub mod observer;
pub mod progress;
pub mod resource_pool;
pub mod scheduler;

pub use backoff::{BackoffPolicy, RetryBackoff};
pub use error::{AppResult, SchedulerError};
pub use executor::{JobError, JobExecutor};
pub use job::{JobId, JobOutcome, JobReport, JobStatus, RunReport};
pub use observer::{
    InMemoryProgressLog, NoopObserver, ProgressEvent, ProgressObserver, TracingObserver,
};
pub use progress::{ProgressBackend, ProgressRecord, ProgressStore, RunStats, StoreError};
pub use resource_pool::{
    PoolError, PoolStats, ResourceError, ResourceFactory, ResourceGuard, ResourceId, ResourcePool,
};
pub use scheduler::{Scheduler, StopHandle};
