//! Tests for progress observers

use prometheus_harvest::core::{
    InMemoryProgressLog, JobId, JobStatus, NoopObserver, ProgressObserver, TracingObserver,
};

#[test]
fn test_in_memory_log_shares_buffer_between_clones() {
    let log = InMemoryProgressLog::new(10);
    let handle = log.clone();
    handle.on_status(&JobId::from("bank-a"), JobStatus::Queued);
    handle.on_status(&JobId::from("bank-b"), JobStatus::Queued);
    handle.on_status(&JobId::from("bank-a"), JobStatus::InProgress);

    let events = log.events();
    assert_eq!(events.len(), 3);
    assert_eq!(events[2].job_id, JobId::from("bank-a"));
    assert_eq!(
        log.statuses_of("bank-a"),
        vec![JobStatus::Queued, JobStatus::InProgress]
    );
    assert!(events.windows(2).all(|w| w[0].at_ms <= w[1].at_ms));
}

#[test]
fn test_builtin_observers_accept_every_status() {
    let job = JobId::from("x");
    for status in [
        JobStatus::Queued,
        JobStatus::InProgress,
        JobStatus::Retrying,
        JobStatus::Completed,
        JobStatus::Failed,
    ] {
        NoopObserver.on_status(&job, status);
        TracingObserver.on_status(&job, status);
    }
}
