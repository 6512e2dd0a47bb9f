//! Pool, scheduler and progress-store configuration structures.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::BackoffPolicy;

/// Environment variable overriding [`PoolConfig::pool_size`].
pub const ENV_POOL_SIZE: &str = "HARVEST_POOL_SIZE";
/// Environment variable overriding [`SchedulerConfig::concurrency`].
pub const ENV_CONCURRENCY: &str = "HARVEST_CONCURRENCY";
/// Environment variable overriding [`SchedulerConfig::max_retries`].
pub const ENV_MAX_RETRIES: &str = "HARVEST_MAX_RETRIES";
/// Environment variable overriding [`StoreConfig::progress_file`].
pub const ENV_PROGRESS_FILE: &str = "HARVEST_PROGRESS_FILE";
/// Environment variable overriding [`PoolConfig::replacement_attempts`].
pub const ENV_REPLACEMENT_ATTEMPTS: &str = "HARVEST_REPLACEMENT_ATTEMPTS";

/// Resource pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of resources kept alive.
    pub pool_size: usize,
    /// Creation attempts when replacing an unhealthy resource.
    pub replacement_attempts: u32,
    /// Pause between replacement attempts in milliseconds.
    pub replacement_backoff_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 3,
            replacement_attempts: 3,
            replacement_backoff_ms: 1_000,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool size.
    #[must_use]
    pub const fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set the number of replacement attempts.
    #[must_use]
    pub const fn with_replacement_attempts(mut self, attempts: u32) -> Self {
        self.replacement_attempts = attempts;
        self
    }

    /// Set the pause between replacement attempts.
    #[must_use]
    pub const fn with_replacement_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.replacement_backoff_ms = backoff_ms;
        self
    }

    /// Pause between replacement attempts.
    #[must_use]
    pub const fn replacement_backoff(&self) -> Duration {
        Duration::from_millis(self.replacement_backoff_ms)
    }

    /// Validate pool configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.pool_size == 0 {
            return Err("pool_size must be greater than 0".into());
        }
        if self.replacement_attempts == 0 {
            return Err("replacement_attempts must be greater than 0".into());
        }
        Ok(())
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of worker threads. Clamped to the pool size at run time.
    pub concurrency: usize,
    /// Executor invocations allowed per job per run.
    pub max_retries: u32,
    /// Delay policy between attempts of the same job.
    pub backoff: BackoffPolicy,
    /// Stack size for worker threads in bytes.
    pub thread_stack_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_retries: 2,
            backoff: BackoffPolicy::default(),
            thread_stack_size: 2 * 1024 * 1024,
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count.
    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the attempt bound.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff policy.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Validate scheduler configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("concurrency must be greater than 0".into());
        }
        if self.max_retries == 0 {
            return Err("max_retries must be greater than 0".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        self.backoff.validate()
    }
}

/// Progress store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the persisted progress record.
    pub progress_file: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            progress_file: PathBuf::from("progress.json"),
        }
    }
}

impl StoreConfig {
    /// Use the given progress file.
    #[must_use]
    pub fn with_progress_file(mut self, path: impl AsRef<Path>) -> Self {
        self.progress_file = path.as_ref().to_path_buf();
        self
    }

    /// Validate store configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.progress_file.as_os_str().is_empty() {
            return Err("progress_file must not be empty".into());
        }
        Ok(())
    }
}

/// Root configuration for a harvest run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Resource pool settings.
    pub pool: PoolConfig,
    /// Scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Progress store settings.
    pub store: StoreConfig,
}

impl HarvestConfig {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns a description prefixed with the offending section.
    pub fn validate(&self) -> Result<(), String> {
        self.pool.validate().map_err(|e| format!("pool invalid: {e}"))?;
        self.scheduler
            .validate()
            .map_err(|e| format!("scheduler invalid: {e}"))?;
        self.store
            .validate()
            .map_err(|e| format!("store invalid: {e}"))?;
        if self.scheduler.concurrency > self.pool.pool_size {
            tracing::warn!(
                concurrency = self.scheduler.concurrency,
                pool_size = self.pool.pool_size,
                "concurrency exceeds pool size; extra workers will be clamped"
            );
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns a read, parse or validation message.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| format!("read error ({}): {e}", path.display()))?;
        Self::from_json_str(&input)
    }

    /// Defaults overridden by `HARVEST_*` environment variables.
    ///
    /// A `.env` file in the working directory is loaded first when present.
    ///
    /// # Errors
    ///
    /// Returns a message when a variable cannot be parsed or validation fails.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply overrides from an arbitrary key lookup (environment, CLI, tests).
    ///
    /// # Errors
    ///
    /// Returns a message naming the variable that failed to parse.
    pub fn apply_overrides<L>(&mut self, lookup: L) -> Result<(), String>
    where
        L: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, ENV_POOL_SIZE)? {
            self.pool.pool_size = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_REPLACEMENT_ATTEMPTS)? {
            self.pool.replacement_attempts = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_CONCURRENCY)? {
            self.scheduler.concurrency = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MAX_RETRIES)? {
            self.scheduler.max_retries = v;
        }
        if let Some(path) = lookup(ENV_PROGRESS_FILE).filter(|p| !p.trim().is_empty()) {
            self.store.progress_file = PathBuf::from(path);
        }
        Ok(())
    }
}

fn parse_var<T, L>(lookup: &L, key: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    L: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| format!("{key}={raw:?}: {e}"))
        })
        .transpose()
}
