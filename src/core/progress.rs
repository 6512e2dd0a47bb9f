//! Durable per-job progress record.
//!
//! The store keeps the authoritative `completed` / `failed` sets in memory and
//! writes the whole record through a [`ProgressBackend`] after every mutation.
//! Persistence problems never stop a run: a missing or corrupt record loads as
//! empty, and a failed write is retried on the next mutation.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use super::JobId;
use crate::infra::store::JsonFileBackend;
use crate::util::clock::now_utc;

/// Errors raised by progress backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("progress io error at {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The persisted record could not be parsed.
    #[error("corrupt progress record at {path}: {message}")]
    Corrupt {
        /// File involved.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
    /// The record could not be encoded.
    #[error("progress encode error: {0}")]
    Encode(#[from] serde_json::Error),
    /// Any other backend failure.
    #[error("progress backend error: {0}")]
    Backend(String),
}

/// Counters stored next to the job sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunStats {
    /// Time of the last successful save.
    #[serde(deserialize_with = "lenient_timestamp")]
    pub last_run: Option<DateTime<Utc>>,
    /// Size of the completed set.
    pub success_count: u64,
    /// Size of the failed set.
    pub failure_count: u64,
}

/// Persisted progress: which jobs are done and which failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressRecord {
    /// Jobs that finished successfully.
    pub completed: BTreeSet<JobId>,
    /// Jobs that exhausted their attempts and have not completed since.
    pub failed: BTreeSet<JobId>,
    /// Bookkeeping counters.
    pub stats: RunStats,
}

impl ProgressRecord {
    /// Enforce disjoint sets (completed wins) and recompute the counters.
    pub fn normalize(&mut self) {
        let completed = &self.completed;
        self.failed.retain(|job| !completed.contains(job));
        self.refresh_counts();
    }

    fn refresh_counts(&mut self) {
        self.stats.success_count = self.completed.len() as u64;
        self.stats.failure_count = self.failed.len() as u64;
    }
}

/// Accepts RFC 3339 or offset-less ISO-8601 (read as UTC); anything else is
/// dropped rather than failing the whole record.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Storage for the full progress record.
pub trait ProgressBackend: Send {
    /// Read the stored record. `Ok(None)` when nothing was stored yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the record exists but cannot be read.
    fn read(&self) -> Result<Option<ProgressRecord>, StoreError>;

    /// Replace the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn write(&mut self, record: &ProgressRecord) -> Result<(), StoreError>;

    /// Human-readable location for logs.
    fn location(&self) -> String;
}

struct Inner<B> {
    record: ProgressRecord,
    backend: B,
    dirty: bool,
}

impl<B: ProgressBackend> Inner<B> {
    fn save(&mut self) -> Result<(), StoreError> {
        self.record.refresh_counts();
        self.record.stats.last_run = Some(now_utc());
        match self.backend.write(&self.record) {
            Ok(()) => {
                self.dirty = false;
                Ok(())
            }
            Err(err) => {
                self.dirty = true;
                tracing::warn!(
                    location = %self.backend.location(),
                    error = %err,
                    "failed to persist progress; will retry on next update"
                );
                Err(err)
            }
        }
    }

    fn save_if(&mut self, changed: bool) {
        if changed || self.dirty {
            // Failures are logged and kept dirty for the next mutation.
            let _ = self.save();
        }
    }
}

/// Thread-safe progress store.
pub struct ProgressStore<B: ProgressBackend> {
    inner: Mutex<Inner<B>>,
}

impl ProgressStore<JsonFileBackend> {
    /// Open the JSON progress file at `path` and load it.
    pub fn open_file(path: impl AsRef<Path>) -> Self {
        Self::open(JsonFileBackend::new(path))
    }
}

impl<B: ProgressBackend> ProgressStore<B> {
    /// Create an empty store without reading the backend.
    pub fn new(backend: B) -> Self {
        Self {
            inner: Mutex::new(Inner {
                record: ProgressRecord::default(),
                backend,
                dirty: false,
            }),
        }
    }

    /// Create a store and load the persisted record.
    pub fn open(backend: B) -> Self {
        let store = Self::new(backend);
        store.load();
        store
    }

    /// Replace in-memory state with the persisted record.
    ///
    /// A missing or unreadable record logs a warning and yields an empty one.
    pub fn load(&self) {
        let mut inner = self.inner.lock();
        let location = inner.backend.location();
        let record = match inner.backend.read() {
            Ok(Some(mut record)) => {
                record.normalize();
                tracing::info!(
                    location = %location,
                    completed = record.completed.len(),
                    failed = record.failed.len(),
                    "loaded progress"
                );
                record
            }
            Ok(None) => {
                tracing::warn!(location = %location, "no progress record found; starting fresh");
                ProgressRecord::default()
            }
            Err(err) => {
                tracing::warn!(
                    location = %location,
                    error = %err,
                    "could not load progress; starting fresh"
                );
                ProgressRecord::default()
            }
        };
        inner.record = record;
        inner.dirty = false;
    }

    /// Whether `job` is recorded as completed.
    #[must_use]
    pub fn is_completed(&self, job: &str) -> bool {
        self.inner.lock().record.completed.contains(job)
    }

    /// Whether `job` is recorded as failed.
    #[must_use]
    pub fn is_failed(&self, job: &str) -> bool {
        self.inner.lock().record.failed.contains(job)
    }

    /// Record a success. Removes the job from the failed set.
    pub fn mark_completed(&self, job: &JobId) {
        let mut inner = self.inner.lock();
        let added = inner.record.completed.insert(job.clone());
        let cleared = inner.record.failed.remove(job.as_str());
        inner.save_if(added || cleared);
    }

    /// Record a failure. No-op for jobs already completed.
    pub fn mark_failed(&self, job: &JobId) {
        let mut inner = self.inner.lock();
        let added =
            !inner.record.completed.contains(job.as_str()) && inner.record.failed.insert(job.clone());
        inner.save_if(added);
    }

    /// Jobs from `jobs` that still need to run, in input order, without
    /// duplicates. Failed jobs are included.
    #[must_use]
    pub fn pending(&self, jobs: &[JobId]) -> Vec<JobId> {
        let inner = self.inner.lock();
        let mut seen = HashSet::with_capacity(jobs.len());
        jobs.iter()
            .filter(|job| !inner.record.completed.contains(job.as_str()))
            .filter(|job| seen.insert(*job))
            .cloned()
            .collect()
    }

    /// Forget all progress and persist the empty record.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.record = ProgressRecord::default();
        inner.save_if(true);
    }

    /// Write the full record now.
    ///
    /// # Errors
    ///
    /// Returns the backend error; in-memory state is kept and the write is
    /// retried on the next mutation.
    pub fn save(&self) -> Result<(), StoreError> {
        self.inner.lock().save()
    }

    /// Write only if an earlier save failed.
    ///
    /// # Errors
    ///
    /// Returns the backend error when the retry fails too.
    pub fn flush(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.dirty {
            inner.save()
        } else {
            Ok(())
        }
    }

    /// Whether the last write failed and has not been retried successfully.
    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        self.inner.lock().dirty
    }

    /// Copy of the in-memory record.
    #[must_use]
    pub fn snapshot(&self) -> ProgressRecord {
        self.inner.lock().record.clone()
    }

    /// Completed jobs, sorted.
    #[must_use]
    pub fn completed(&self) -> Vec<JobId> {
        self.inner.lock().record.completed.iter().cloned().collect()
    }

    /// Failed jobs, sorted.
    #[must_use]
    pub fn failed(&self) -> Vec<JobId> {
        self.inner.lock().record.failed.iter().cloned().collect()
    }

    /// Backend location for logs.
    #[must_use]
    pub fn location(&self) -> String {
        self.inner.lock().backend.location()
    }
}

impl<B: ProgressBackend> std::fmt::Debug for ProgressStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ProgressStore")
            .field("location", &inner.backend.location())
            .field("completed", &inner.record.completed.len())
            .field("failed", &inner.record.failed.len())
            .field("dirty", &inner.dirty)
            .finish()
    }
}
