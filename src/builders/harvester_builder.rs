//! Build a ready-to-run scheduler from a [`HarvestConfig`].

use std::sync::Arc;

use anyhow::Context;

use crate::config::HarvestConfig;
use crate::core::{
    AppResult, JobExecutor, JobId, ProgressBackend, ProgressObserver, ProgressStore,
    ResourceFactory, ResourcePool, RunReport, Scheduler, SchedulerError,
};
use crate::infra::JsonFileBackend;

/// Build a scheduler persisting progress to `cfg.store.progress_file`.
///
/// The progress file is loaded first, then every resource is created. A
/// resource creation failure tears down what was created and is returned as
/// [`SchedulerError::PoolInit`]; no job runs in that case.
///
/// # Errors
///
/// - `SchedulerError::InvalidConfig` if the configuration is invalid
/// - `SchedulerError::PoolInit` if the pool could not be filled
pub fn build_scheduler<F>(
    cfg: &HarvestConfig,
    factory: F,
) -> Result<Scheduler<F, JsonFileBackend>, SchedulerError>
where
    F: ResourceFactory,
{
    let backend = JsonFileBackend::new(&cfg.store.progress_file);
    build_scheduler_with_backend(cfg, factory, backend)
}

/// Build a scheduler with an explicit progress backend.
///
/// # Errors
///
/// Same as [`build_scheduler`].
pub fn build_scheduler_with_backend<F, B>(
    cfg: &HarvestConfig,
    factory: F,
    backend: B,
) -> Result<Scheduler<F, B>, SchedulerError>
where
    F: ResourceFactory,
    B: ProgressBackend + 'static,
{
    cfg.validate().map_err(SchedulerError::InvalidConfig)?;

    let store = Arc::new(ProgressStore::open(backend));
    let pool =
        ResourcePool::initialize(factory, cfg.pool.clone()).map_err(SchedulerError::PoolInit)?;

    tracing::info!(
        pool_size = cfg.pool.pool_size,
        concurrency = cfg.scheduler.concurrency,
        max_retries = cfg.scheduler.max_retries,
        progress = %store.location(),
        "scheduler ready"
    );

    Scheduler::new(pool, store, cfg.scheduler.clone())
}

/// Build, run one batch, and shut the pool down.
///
/// The pool is shut down whether or not the run succeeds.
///
/// # Errors
///
/// Returns an error if the scheduler cannot be built or the run aborts.
pub fn run_batch<F, E, P, O>(
    cfg: &HarvestConfig,
    factory: F,
    jobs: &[JobId],
    executor: E,
    observer: O,
) -> AppResult<RunReport<P>>
where
    F: ResourceFactory,
    E: JobExecutor<F::Resource, P>,
    P: Send + 'static,
    O: ProgressObserver + 'static,
{
    let scheduler = build_scheduler(cfg, factory).context("failed to build scheduler")?;
    let result = scheduler.run(jobs, executor, observer);
    scheduler.pool().shutdown();
    let report = result.context("batch run aborted")?;
    tracing::info!(%report, "batch finished");
    Ok(report)
}
