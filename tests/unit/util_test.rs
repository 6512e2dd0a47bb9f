//! Tests for utility helpers

use prometheus_harvest::util::{init_tracing, now_ms, now_utc};

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    tracing::info!("tracing initialized twice without panicking");
}

#[test]
fn test_clock_helpers_agree() {
    let ms = now_ms();
    let utc = now_utc();
    let diff = i128::from(utc.timestamp_millis()) - i128::try_from(ms).unwrap();
    assert!(diff.abs() < 1_000);
}
