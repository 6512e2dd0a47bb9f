//! Job identity, lifecycle status and run reports.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable, unique key of one unit of external work.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Create a job id from any string-like key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the underlying key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for JobId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Live status reported to progress observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting for a worker.
    Queued,
    /// A worker picked the job up.
    InProgress,
    /// An attempt failed and another one will follow.
    Retrying,
    /// Job finished successfully and was recorded.
    Completed,
    /// Job exhausted its attempts and was recorded as failed.
    Failed,
}

impl JobStatus {
    /// Lower-case label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome of a job within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Executor succeeded during this run.
    Succeeded,
    /// Job was already recorded as completed before this run; not executed.
    AlreadyCompleted,
    /// All attempts failed; recorded as failed.
    Failed,
    /// Run was stopped before the job finished; nothing was recorded.
    Cancelled,
}

impl JobOutcome {
    /// Whether the job counts as done.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Succeeded | Self::AlreadyCompleted)
    }
}

/// Per-job result of a run.
#[derive(Debug, Clone)]
pub struct JobReport<P> {
    /// Final outcome.
    pub outcome: JobOutcome,
    /// Number of executor invocations made in this run.
    pub attempts: u32,
    /// Message of the last failed attempt, if any.
    pub last_error: Option<String>,
    /// Payload returned by the successful attempt.
    pub payload: Option<P>,
}

impl<P> JobReport<P> {
    /// Report for a job that was skipped because it was already done.
    #[must_use]
    pub const fn already_completed() -> Self {
        Self {
            outcome: JobOutcome::AlreadyCompleted,
            attempts: 0,
            last_error: None,
            payload: None,
        }
    }

    /// Report for a job that never reached a terminal state.
    #[must_use]
    pub const fn cancelled(attempts: u32, last_error: Option<String>) -> Self {
        Self {
            outcome: JobOutcome::Cancelled,
            attempts,
            last_error,
            payload: None,
        }
    }
}

/// Aggregated result of one `Scheduler::run` call.
#[derive(Debug, Clone)]
pub struct RunReport<P> {
    /// Unique id of this run, also attached to the run's tracing span.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Outcome of every distinct job passed to the run.
    pub jobs: HashMap<JobId, JobReport<P>>,
}

impl<P> RunReport<P> {
    fn ids_where(&self, pred: impl Fn(JobOutcome) -> bool) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|(_, report)| pred(report.outcome))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Jobs that are done, including those completed in earlier runs.
    #[must_use]
    pub fn succeeded(&self) -> Vec<JobId> {
        self.ids_where(JobOutcome::is_success)
    }

    /// Jobs that exhausted their attempts in this run.
    #[must_use]
    pub fn failed(&self) -> Vec<JobId> {
        self.ids_where(|o| o == JobOutcome::Failed)
    }

    /// Jobs skipped because an earlier run completed them.
    #[must_use]
    pub fn already_completed(&self) -> Vec<JobId> {
        self.ids_where(|o| o == JobOutcome::AlreadyCompleted)
    }

    /// Jobs left unfinished because the run was stopped.
    #[must_use]
    pub fn cancelled(&self) -> Vec<JobId> {
        self.ids_where(|o| o == JobOutcome::Cancelled)
    }

    /// Look up a single job.
    #[must_use]
    pub fn get(&self, job: &str) -> Option<&JobReport<P>> {
        self.jobs.get(job)
    }

    /// Whether every job in the run is done.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.jobs.values().all(|r| r.outcome.is_success())
    }

    /// Total executor invocations across all jobs.
    #[must_use]
    pub fn total_attempts(&self) -> u64 {
        self.jobs.values().map(|r| u64::from(r.attempts)).sum()
    }
}

impl<P> fmt::Display for RunReport<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = self.finished_at - self.started_at;
        write!(
            f,
            "run {}: {} jobs, {} succeeded ({} already completed), {} failed, {} cancelled in {:.1}s",
            self.run_id,
            self.jobs.len(),
            self.succeeded().len(),
            self.already_completed().len(),
            self.failed().len(),
            self.cancelled().len(),
            elapsed.num_milliseconds() as f64 / 1000.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: JobOutcome, attempts: u32) -> JobReport<()> {
        JobReport {
            outcome,
            attempts,
            last_error: None,
            payload: None,
        }
    }

    #[test]
    fn test_job_id_conversions() {
        let a = JobId::from("bank-a");
        let b = JobId::new(String::from("bank-a"));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "bank-a");
        assert_eq!(a.to_string(), "bank-a");
    }

    #[test]
    fn test_job_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&JobId::from("x")).unwrap();
        assert_eq!(json, "\"x\"");
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(JobStatus::InProgress.to_string(), "in_progress");
        assert_eq!(
            serde_json::to_string(&JobStatus::Retrying).unwrap(),
            "\"retrying\""
        );
    }

    #[test]
    fn test_run_report_partitions() {
        let now = Utc::now();
        let mut jobs = HashMap::new();
        jobs.insert(JobId::from("a"), report(JobOutcome::Succeeded, 1));
        jobs.insert(JobId::from("b"), report(JobOutcome::Failed, 2));
        jobs.insert(JobId::from("c"), report(JobOutcome::AlreadyCompleted, 0));
        jobs.insert(JobId::from("d"), report(JobOutcome::Cancelled, 0));
        let run = RunReport {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            jobs,
        };

        assert_eq!(run.succeeded(), vec![JobId::from("a"), JobId::from("c")]);
        assert_eq!(run.failed(), vec![JobId::from("b")]);
        assert_eq!(run.already_completed(), vec![JobId::from("c")]);
        assert_eq!(run.cancelled(), vec![JobId::from("d")]);
        assert_eq!(run.total_attempts(), 3);
        assert!(!run.all_succeeded());
        assert!(run.get("b").is_some());
        assert!(run.to_string().contains("4 jobs"));
    }
}
