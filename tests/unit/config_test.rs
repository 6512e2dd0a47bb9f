//! Tests for configuration validation and loading

use prometheus_harvest::config::{
    HarvestConfig, PoolConfig, SchedulerConfig, StoreConfig, ENV_CONCURRENCY, ENV_MAX_RETRIES,
    ENV_POOL_SIZE, ENV_PROGRESS_FILE,
};
use prometheus_harvest::core::BackoffPolicy;
use std::collections::HashMap;
use std::path::PathBuf;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn test_defaults_mirror_legacy_tool() {
    let cfg = HarvestConfig::default();
    assert_eq!(cfg.pool.pool_size, 3);
    assert_eq!(cfg.scheduler.concurrency, 3);
    assert_eq!(cfg.scheduler.max_retries, 2);
    assert_eq!(cfg.store.progress_file, PathBuf::from("progress.json"));
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_pool_config_invalid_size() {
    let invalid = PoolConfig::new().with_pool_size(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_invalid_replacement_attempts() {
    let invalid = PoolConfig::new().with_replacement_attempts(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_invalid_values() {
    assert!(SchedulerConfig::new().with_concurrency(0).validate().is_err());
    assert!(SchedulerConfig::new().with_max_retries(0).validate().is_err());
    let inverted = SchedulerConfig::new().with_backoff(BackoffPolicy::Linear {
        step_ms: 100,
        max_ms: 10,
        jitter_ms: 0,
    });
    assert!(inverted.validate().is_err());
}

#[test]
fn test_store_config_rejects_empty_path() {
    let invalid = StoreConfig::default().with_progress_file("");
    assert!(invalid.validate().is_err());
}

#[test]
fn test_validate_names_the_section() {
    let mut cfg = HarvestConfig::default();
    cfg.scheduler.max_retries = 0;
    let err = cfg.validate().unwrap_err();
    assert!(err.starts_with("scheduler invalid"), "{err}");
}

#[test]
fn test_from_json_str_fills_missing_fields() {
    let cfg = HarvestConfig::from_json_str(
        r#"{
            "pool": { "pool_size": 5 },
            "scheduler": { "max_retries": 4, "backoff": { "kind": "exponential", "base_ms": 100, "max_ms": 2000 } },
            "store": { "progress_file": "/var/lib/harvest/progress.json" }
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.pool.pool_size, 5);
    assert_eq!(cfg.pool.replacement_attempts, PoolConfig::default().replacement_attempts);
    assert_eq!(cfg.scheduler.concurrency, 3);
    assert_eq!(cfg.scheduler.max_retries, 4);
    assert_eq!(
        cfg.scheduler.backoff,
        BackoffPolicy::Exponential {
            base_ms: 100,
            max_ms: 2000,
            jitter_ms: 0
        }
    );
    assert_eq!(
        cfg.store.progress_file,
        PathBuf::from("/var/lib/harvest/progress.json")
    );
}

#[test]
fn test_from_json_str_rejects_invalid_values() {
    assert!(HarvestConfig::from_json_str(r#"{"pool": {"pool_size": 0}}"#).is_err());
    assert!(HarvestConfig::from_json_str("not json").is_err());
}

#[test]
fn test_from_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harvest.json");
    std::fs::write(&path, r#"{"scheduler": {"concurrency": 2}}"#).unwrap();
    let cfg = HarvestConfig::from_json_file(&path).unwrap();
    assert_eq!(cfg.scheduler.concurrency, 2);

    let missing = HarvestConfig::from_json_file(dir.path().join("absent.json"));
    assert!(missing.unwrap_err().starts_with("read error"));
}

#[test]
fn test_overrides_apply_over_defaults() {
    let mut cfg = HarvestConfig::default();
    cfg.apply_overrides(lookup(&[
        (ENV_POOL_SIZE, "4"),
        (ENV_CONCURRENCY, " 2 "),
        (ENV_MAX_RETRIES, "5"),
        (ENV_PROGRESS_FILE, "state/run.json"),
    ]))
    .unwrap();
    assert_eq!(cfg.pool.pool_size, 4);
    assert_eq!(cfg.scheduler.concurrency, 2);
    assert_eq!(cfg.scheduler.max_retries, 5);
    assert_eq!(cfg.store.progress_file, PathBuf::from("state/run.json"));
}

#[test]
fn test_override_parse_error_names_the_variable() {
    let mut cfg = HarvestConfig::default();
    let err = cfg
        .apply_overrides(lookup(&[(ENV_POOL_SIZE, "three")]))
        .unwrap_err();
    assert!(err.contains(ENV_POOL_SIZE), "{err}");
}

#[test]
fn test_config_serializes_round_trip_through_json() {
    let cfg = HarvestConfig::default();
    let json = serde_json::to_string(&cfg).unwrap();
    assert_eq!(HarvestConfig::from_json_str(&json).unwrap(), cfg);
}
