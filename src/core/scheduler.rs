//! Concurrent, retrying job scheduler.
//!
//! A run filters the job list against the [`ProgressStore`], spreads the
//! remaining jobs over a fixed set of worker threads, and returns a
//! [`RunReport`] with one entry per distinct job. Only infrastructure failures
//! abort a run; job failures are data.
//!
//! # Design Principles
//!
//! - **No polling**: workers block on the job channel; resource waits use the
//!   pool's Condvar
//! - **Bounded work**: at most `max_retries` executor calls per job per run
//! - **Cooperative stop**: a [`StopHandle`] is checked before each job and
//!   between attempts

mod worker;

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::unbounded;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::util::clock::now_utc;

use super::backoff::RetryBackoff;
use super::error::SchedulerError;
use super::executor::JobExecutor;
use super::job::{JobId, JobReport, JobStatus, RunReport};
use super::observer::ProgressObserver;
use super::progress::{ProgressBackend, ProgressStore};
use super::resource_pool::{ResourceFactory, ResourcePool};

use worker::{panic_message, spawn_worker, JobRunner};

/// Cloneable flag asking a running batch to stop.
///
/// Workers finish the attempt in progress, then stop picking up work. Jobs that
/// did not reach a terminal state are reported as cancelled and stay pending in
/// the store.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    /// New, unset handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether a stop was requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Clear the flag so the scheduler can run again.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Deliver a status change, containing observer panics.
pub(crate) fn notify<O: ProgressObserver + ?Sized>(observer: &O, job: &JobId, status: JobStatus) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| observer.on_status(job, status))) {
        warn!(
            job_id = %job,
            status = status.as_str(),
            panic = %panic_message(panic.as_ref()),
            "progress observer panicked"
        );
    }
}

/// Runs job batches against a resource pool and a progress store.
pub struct Scheduler<F, B>
where
    F: ResourceFactory,
    B: ProgressBackend,
{
    pool: ResourcePool<F>,
    store: Arc<ProgressStore<B>>,
    config: SchedulerConfig,
    backoff: Arc<dyn RetryBackoff>,
    stop: StopHandle,
}

impl<F, B> Scheduler<F, B>
where
    F: ResourceFactory,
    B: ProgressBackend + 'static,
{
    /// Create a scheduler over an initialized pool and a loaded store.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] if `config` is invalid.
    pub fn new(
        pool: ResourcePool<F>,
        store: Arc<ProgressStore<B>>,
        config: SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        let backoff: Arc<dyn RetryBackoff> = Arc::new(config.backoff);
        Ok(Self {
            pool,
            store,
            config,
            backoff,
            stop: StopHandle::new(),
        })
    }

    /// Replace the backoff policy from the configuration.
    #[must_use]
    pub fn with_backoff(mut self, backoff: impl RetryBackoff + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Handle that stops the current or next run.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// The resource pool.
    #[must_use]
    pub const fn pool(&self) -> &ResourcePool<F> {
        &self.pool
    }

    /// The progress store.
    #[must_use]
    pub const fn store(&self) -> &Arc<ProgressStore<B>> {
        &self.store
    }

    /// Scheduler configuration.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run every job in `jobs` that is not already completed.
    ///
    /// Duplicate ids are run once. Jobs completed in earlier runs are reported
    /// as already completed without calling the executor.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Internal`] if no worker thread could be
    /// started.
    pub fn run<E, P, O>(
        &self,
        jobs: &[JobId],
        executor: E,
        observer: O,
    ) -> Result<RunReport<P>, SchedulerError>
    where
        E: JobExecutor<F::Resource, P>,
        P: Send + 'static,
        O: ProgressObserver + 'static,
    {
        let run_id = Uuid::new_v4();
        let started_at = now_utc();
        let span = info_span!("harvest_run", %run_id);
        let _entered = span.enter();

        let todo = self.store.pending(jobs);
        let todo_set: HashSet<&JobId> = todo.iter().collect();
        let mut reports: HashMap<JobId, JobReport<P>> = HashMap::with_capacity(jobs.len());
        for job in jobs.iter().filter(|job| !todo_set.contains(job)) {
            reports
                .entry(job.clone())
                .or_insert_with(JobReport::already_completed);
        }

        info!(
            pending = todo.len(),
            already_completed = reports.len(),
            "starting run"
        );

        if !todo.is_empty() {
            self.run_pending(&todo, executor, observer, span.clone(), &mut reports)?;
        }

        if let Err(err) = self.store.flush() {
            error!(error = %err, "progress could not be persisted at end of run");
        }

        let report = RunReport {
            run_id,
            started_at,
            finished_at: now_utc(),
            jobs: reports,
        };
        info!(
            succeeded = report.succeeded().len(),
            failed = report.failed().len(),
            cancelled = report.cancelled().len(),
            attempts = report.total_attempts(),
            "run finished"
        );
        Ok(report)
    }

    fn run_pending<E, P, O>(
        &self,
        todo: &[JobId],
        executor: E,
        observer: O,
        span: tracing::Span,
        reports: &mut HashMap<JobId, JobReport<P>>,
    ) -> Result<(), SchedulerError>
    where
        E: JobExecutor<F::Resource, P>,
        P: Send + 'static,
        O: ProgressObserver + 'static,
    {
        let observer = Arc::new(observer);
        for job in todo {
            notify(&*observer, job, JobStatus::Queued);
        }

        let (job_tx, job_rx) = unbounded::<JobId>();
        for job in todo {
            job_tx
                .send(job.clone())
                .map_err(|e| SchedulerError::Internal(e.to_string()))?;
        }
        drop(job_tx);

        let runner = Arc::new(JobRunner {
            pool: self.pool.clone(),
            store: Arc::clone(&self.store),
            executor,
            observer,
            backoff: Arc::clone(&self.backoff),
            stop: self.stop.clone(),
            max_retries: self.config.max_retries,
        });

        let (result_tx, result_rx) = unbounded();
        let worker_count = self.worker_count(todo.len());
        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            match spawn_worker(
                worker_id,
                Arc::clone(&runner),
                job_rx.clone(),
                result_tx.clone(),
                self.config.thread_stack_size,
                span.clone(),
            ) {
                Ok(handle) => handles.push(handle),
                Err(e) => error!(worker_id, error = %e, "failed to spawn worker thread"),
            }
        }
        drop(result_tx);
        drop(runner);

        if handles.is_empty() {
            return Err(SchedulerError::Internal(
                "no worker thread could be started".into(),
            ));
        }
        info!(workers = handles.len(), "workers started");

        for (job, report) in result_rx.iter() {
            reports.insert(job, report);
        }
        for handle in handles {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }

        // Jobs still queued after a stop, or lost with a crashed worker.
        for job in todo {
            reports
                .entry(job.clone())
                .or_insert_with(|| JobReport::cancelled(0, None));
        }
        Ok(())
    }

    fn worker_count(&self, pending: usize) -> usize {
        let pool_size = self.pool.size();
        let mut workers = self.config.concurrency;
        if workers > pool_size {
            warn!(
                concurrency = workers,
                pool_size, "concurrency exceeds pool size; clamping"
            );
            workers = pool_size;
        }
        workers.min(pending).max(1)
    }
}

impl<F, B> std::fmt::Debug for Scheduler<F, B>
where
    F: ResourceFactory,
    B: ProgressBackend,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pool", &self.pool)
            .field("store", &self.store)
            .field("config", &self.config)
            .field("stopped", &self.stop.is_stopped())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_handle_is_shared_between_clones() {
        let a = StopHandle::new();
        let b = a.clone();
        assert!(!b.is_stopped());
        a.stop();
        assert!(b.is_stopped());
        b.reset();
        assert!(!a.is_stopped());
    }

    #[test]
    fn test_observer_panics_are_contained() {
        let obs = |_: &JobId, _: JobStatus| panic!("observer bug");
        notify(&obs, &JobId::from("a"), JobStatus::Queued);
    }
}
