//! Unit tests for individual components

mod backoff_test;
mod config_test;
mod error_test;
mod observer_test;
mod util_test;
