//! Progress observers.
//!
//! Observers receive live status changes from the scheduler. They are called
//! from worker threads and must not block; a panicking observer is logged and
//! otherwise ignored.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{JobId, JobStatus};
use crate::util::clock::now_ms;

/// Receives `(job, status)` notifications during a run.
pub trait ProgressObserver: Send + Sync {
    /// Called on every status change.
    fn on_status(&self, job: &JobId, status: JobStatus);
}

impl<F> ProgressObserver for F
where
    F: Fn(&JobId, JobStatus) + Send + Sync,
{
    fn on_status(&self, job: &JobId, status: JobStatus) {
        self(job, status);
    }
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_status(&self, _job: &JobId, _status: JobStatus) {}
}

/// Observer that emits a tracing event per status change.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_status(&self, job: &JobId, status: JobStatus) {
        tracing::info!(job_id = %job, status = status.as_str(), "job status changed");
    }
}

/// One recorded status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Job the change refers to.
    pub job_id: JobId,
    /// New status.
    pub status: JobStatus,
    /// Wall-clock timestamp in milliseconds.
    pub at_ms: u128,
}

/// Bounded in-memory event log for tests and dashboards.
///
/// Clones share the same buffer, so one clone can be handed to the scheduler
/// while another is inspected.
#[derive(Debug, Clone)]
pub struct InMemoryProgressLog {
    events: Arc<Mutex<VecDeque<ProgressEvent>>>,
    max_events: usize,
}

impl InMemoryProgressLog {
    /// Create a log keeping at most `max_events` entries; oldest are dropped.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events.min(1024)))),
            max_events: max_events.max(1),
        }
    }

    /// Snapshot of stored events in arrival order.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Statuses seen for one job, in order.
    #[must_use]
    pub fn statuses_of(&self, job: &str) -> Vec<JobStatus> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.job_id.as_str() == job)
            .map(|e| e.status)
            .collect()
    }
}

impl ProgressObserver for InMemoryProgressLog {
    fn on_status(&self, job: &JobId, status: JobStatus) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(ProgressEvent {
            job_id: job.clone(),
            status,
            at_ms: now_ms(),
        });
    }
}
