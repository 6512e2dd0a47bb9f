//! Configuration models for the pool, scheduler and progress store.

pub mod pool;

pub use pool::{
    HarvestConfig, PoolConfig, SchedulerConfig, StoreConfig, ENV_CONCURRENCY, ENV_MAX_RETRIES,
    ENV_POOL_SIZE, ENV_PROGRESS_FILE, ENV_REPLACEMENT_ATTEMPTS,
};
