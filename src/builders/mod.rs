//! Builders to construct orchestration components from configuration.

pub mod harvester_builder;

pub use harvester_builder::{build_scheduler, build_scheduler_with_backend, run_batch};
