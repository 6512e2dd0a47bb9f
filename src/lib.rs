//! # Prometheus Harvest
//!
//! A resumable, resource-bounded job orchestrator for record-collection workloads.
//!
//! Harvesting records from a remote source means driving dozens of independent,
//! failure-prone jobs through a handful of expensive, stateful sessions (remote
//! browser automation sessions, authenticated API clients, ...). This crate provides
//! the orchestration layer for that work and nothing else: site navigation, parsing
//! and report rendering are supplied by the caller through a narrow executor trait.
//!
//! ## Core Problem Solved
//!
//! - **Expensive Resources**: Sessions are slow to create, so a fixed set of them is
//!   created up front and lent to workers one at a time
//! - **Flaky Sessions**: A session that fails its liveness probe is destroyed and
//!   replaced without the job outcome noticing
//! - **Partial Failures**: Every job is retried a bounded number of times; one bad
//!   job never aborts the batch
//! - **Interrupted Runs**: Completed jobs are recorded durably, so re-running the tool
//!   only does the remaining work
//!
//! ## Key Features
//!
//! - **ResourcePool**: Fixed-size pool with blocking `Condvar` acquire and
//!   transparent replacement of unhealthy resources
//! - **ProgressStore**: Crash-tolerant JSON record of completed and failed jobs
//! - **Scheduler**: Dedicated worker threads, bounded retries, pluggable backoff,
//!   cooperative cancellation and a complete per-job report
//!
//! ## Example
//!
//! ```rust,ignore
//! use prometheus_harvest::builders::build_scheduler;
//! use prometheus_harvest::config::HarvestConfig;
//! use prometheus_harvest::core::{JobId, TracingObserver};
//!
//! let config = HarvestConfig::from_env()?;
//! let scheduler = build_scheduler(&config, BrowserFactory::new())?;
//!
//! let jobs: Vec<JobId> = ["alpha", "beta", "gamma"].into_iter().map(JobId::from).collect();
//! let report = scheduler.run(&jobs, ScrapeExecutor::default(), TracingObserver)?;
//! println!("{report}");
//!
//! scheduler.pool().shutdown();
//! ```
//!
//! For complete examples, see:
//! - `tests/scheduler_test.rs` - End-to-end batch scenarios
//! - `tests/resource_pool_test.rs` - Pool invariants under concurrency

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core orchestration: resource pool, progress store, scheduler.
pub mod core;
/// Configuration models for the pool, scheduler and progress store.
pub mod config;
/// Builders to construct orchestration components from configuration.
pub mod builders;
/// Infrastructure adapters for progress persistence backends.
pub mod infra;
/// Shared utilities.
pub mod util;
