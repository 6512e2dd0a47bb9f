//! Tests for retry backoff policies

use prometheus_harvest::core::{BackoffPolicy, RetryBackoff};
use std::time::Duration;

#[test]
fn test_fixed_with_jitter_stays_in_range() {
    let policy = BackoffPolicy::Fixed {
        delay_ms: 50,
        jitter_ms: 10,
    };
    for attempt in 1..=20 {
        let d = policy.delay(attempt);
        assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(60));
    }
}

#[test]
fn test_base_delay_ignores_jitter() {
    let policy = BackoffPolicy::Exponential {
        base_ms: 10,
        max_ms: 1_000,
        jitter_ms: 500,
    };
    assert_eq!(policy.base_delay(3), Duration::from_millis(40));
}

#[test]
fn test_custom_backoff_trait_object() {
    struct Doubling;
    impl RetryBackoff for Doubling {
        fn delay(&self, failed_attempts: u32) -> Duration {
            Duration::from_millis(u64::from(failed_attempts) * 2)
        }
    }
    let policy: Box<dyn RetryBackoff> = Box::new(Doubling);
    assert_eq!(policy.delay(3), Duration::from_millis(6));
}

#[test]
fn test_serialized_form_is_tagged() {
    let json = serde_json::to_value(BackoffPolicy::default()).unwrap();
    assert_eq!(json["kind"], "fixed");
    assert_eq!(json["delay_ms"], 1000);
    assert_eq!(json["jitter_ms"], 1000);
}
