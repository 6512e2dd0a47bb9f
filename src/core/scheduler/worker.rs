//! Worker threads and the per-job attempt loop.
//!
//! Each worker is a dedicated OS thread with its own single-threaded tokio
//! runtime. Workers pull job ids from a shared channel until it is empty or the
//! run is stopped, and send one [`JobReport`] per job they picked up.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use futures::FutureExt;
use tracing::{debug, error, info, warn, Span};

use crate::core::backoff::RetryBackoff;
use crate::core::executor::{JobError, JobExecutor};
use crate::core::job::{JobId, JobOutcome, JobReport, JobStatus};
use crate::core::observer::ProgressObserver;
use crate::core::progress::{ProgressBackend, ProgressStore};
use crate::core::resource_pool::{PoolError, ResourceFactory, ResourceGuard, ResourcePool};

use super::{notify, StopHandle};

/// Everything a worker needs to run jobs, shared by all workers of a run.
pub(super) struct JobRunner<F, B, E, O>
where
    F: ResourceFactory,
    B: ProgressBackend,
{
    pub(super) pool: ResourcePool<F>,
    pub(super) store: Arc<ProgressStore<B>>,
    pub(super) executor: E,
    pub(super) observer: Arc<O>,
    pub(super) backoff: Arc<dyn RetryBackoff>,
    pub(super) stop: StopHandle,
    pub(super) max_retries: u32,
}

impl<F, B, E, O> JobRunner<F, B, E, O>
where
    F: ResourceFactory,
    B: ProgressBackend,
    O: ProgressObserver,
{
    /// Run one job to a terminal state, or until the run is stopped.
    ///
    /// A `Failed` attempt keeps the resource for the next attempt; a
    /// `ResourceLost` attempt (or a panic) hands it back as unhealthy and the
    /// next attempt acquires a fresh one.
    pub(super) async fn run_job<P>(&self, job: &JobId) -> JobReport<P>
    where
        E: JobExecutor<F::Resource, P>,
        P: Send + 'static,
    {
        let mut attempts = 0_u32;
        let mut last_error: Option<String> = None;
        let mut lease: Option<ResourceGuard<F>> = None;

        while attempts < self.max_retries {
            if attempts > 0 && self.stop.is_stopped() {
                info!(job_id = %job, attempts, "run stopped; leaving job pending");
                return JobReport::cancelled(attempts, last_error);
            }

            let mut guard = match lease.take() {
                Some(guard) => guard,
                None => match self.pool.acquire() {
                    Ok(guard) => guard,
                    Err(PoolError::Shutdown) => {
                        warn!(job_id = %job, "pool shut down; leaving job pending");
                        return JobReport::cancelled(attempts, last_error);
                    }
                    Err(err) => {
                        error!(job_id = %job, error = %err, "no resource available");
                        last_error = Some(err.to_string());
                        break;
                    }
                },
            };

            attempts += 1;
            debug!(
                job_id = %job,
                attempt = attempts,
                resource_id = guard.id(),
                "executing job"
            );

            let outcome = AssertUnwindSafe(self.executor.execute(job, &mut *guard))
                .catch_unwind()
                .await;
            let err = match outcome {
                Ok(Ok(payload)) => {
                    guard.release(true);
                    self.store.mark_completed(job);
                    notify(&*self.observer, job, JobStatus::Completed);
                    info!(job_id = %job, attempts, "job completed");
                    return JobReport {
                        outcome: JobOutcome::Succeeded,
                        attempts,
                        last_error,
                        payload: Some(payload),
                    };
                }
                Ok(Err(err)) => err,
                Err(panic) => JobError::ResourceLost(format!(
                    "executor panicked: {}",
                    panic_message(panic.as_ref())
                )),
            };

            warn!(
                job_id = %job,
                attempt = attempts,
                max_retries = self.max_retries,
                error = %err,
                "attempt failed"
            );
            if err.is_resource_lost() {
                guard.release(false);
            } else {
                lease = Some(guard);
            }
            last_error = Some(err.to_string());

            if attempts < self.max_retries {
                notify(&*self.observer, job, JobStatus::Retrying);
                let delay = self.backoff.delay(attempts);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        // Release before recording; the probe decides whether the resource survives.
        if let Some(guard) = lease.take() {
            guard.release(true);
        }
        self.store.mark_failed(job);
        notify(&*self.observer, job, JobStatus::Failed);
        error!(job_id = %job, attempts, error = ?last_error, "job failed");
        JobReport {
            outcome: JobOutcome::Failed,
            attempts,
            last_error,
            payload: None,
        }
    }
}

/// Spawn one worker thread.
pub(super) fn spawn_worker<F, B, E, O, P>(
    worker_id: usize,
    runner: Arc<JobRunner<F, B, E, O>>,
    jobs: Receiver<JobId>,
    results: Sender<(JobId, JobReport<P>)>,
    stack_size: usize,
    span: Span,
) -> std::io::Result<JoinHandle<()>>
where
    F: ResourceFactory,
    B: ProgressBackend + 'static,
    E: JobExecutor<F::Resource, P>,
    O: ProgressObserver + 'static,
    P: Send + 'static,
{
    thread::Builder::new()
        .name(format!("harvest-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            let _entered = span.enter();
            debug!(worker_id, "worker thread started");

            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!(worker_id, error = %e, "failed to create worker runtime");
                    return;
                }
            };

            loop {
                if runner.stop.is_stopped() {
                    debug!(worker_id, "stop requested, exiting");
                    break;
                }
                let Ok(job) = jobs.recv() else {
                    debug!(worker_id, "job queue drained, exiting");
                    break;
                };
                if runner.stop.is_stopped() {
                    let _ = results.send((job, JobReport::cancelled(0, None)));
                    break;
                }

                notify(&*runner.observer, &job, JobStatus::InProgress);
                let report = rt.block_on(runner.run_job(&job));
                if results.send((job, report)).is_err() {
                    break;
                }
            }

            debug!(worker_id, "worker thread exiting");
        })
}

/// Best-effort text of a panic payload.
pub(super) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}
