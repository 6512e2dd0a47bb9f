//! Tests for error types

use prometheus_harvest::core::{JobError, PoolError, ResourceError, SchedulerError, StoreError};
use std::error::Error;

#[test]
fn test_pool_init_error_keeps_source_chain() {
    let err = SchedulerError::PoolInit(PoolError::Initialization {
        created: 1,
        requested: 3,
        source: ResourceError::new("chrome not found"),
    });
    assert_eq!(
        err.to_string(),
        "resource pool initialization failed: failed to create resource 2 of 3: chrome not found"
    );
    let pool_err = err.source().unwrap();
    assert!(pool_err.source().unwrap().to_string().contains("chrome not found"));
}

#[test]
fn test_resource_error_with_source() {
    let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "port 9515");
    let err = ResourceError::with_source("driver did not start", io);
    assert_eq!(err.to_string(), "driver did not start: port 9515");
    assert!(err.source().unwrap().to_string().contains("9515"));
}

#[test]
fn test_pool_error_messages() {
    assert_eq!(PoolError::Shutdown.to_string(), "pool has been shut down");
    assert_eq!(PoolError::Exhausted.to_string(), "pool has no remaining capacity");
    assert_eq!(
        PoolError::InvalidConfig("pool_size must be greater than 0".into()).to_string(),
        "invalid configuration: pool_size must be greater than 0"
    );
}

#[test]
fn test_job_error_messages() {
    assert_eq!(JobError::failed("timeout").to_string(), "job failed: timeout");
    assert_eq!(
        JobError::resource_lost("tab crashed").to_string(),
        "resource lost: tab crashed"
    );
}

#[test]
fn test_store_error_messages() {
    let err = StoreError::Corrupt {
        path: "progress.json".into(),
        message: "expected value at line 1".into(),
    };
    assert_eq!(
        err.to_string(),
        "corrupt progress record at progress.json: expected value at line 1"
    );
    assert_eq!(
        StoreError::Backend("disk full".into()).to_string(),
        "progress backend error: disk full"
    );
}

#[test]
fn test_scheduler_error_into_anyhow() {
    let result: prometheus_harvest::core::AppResult<()> =
        Err(SchedulerError::Internal("no worker thread could be started".into()).into());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("no worker thread could be started"));
}
