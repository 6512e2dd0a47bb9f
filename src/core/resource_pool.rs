//! Fixed-size pool of expensive, stateful resources.
//!
//! The pool creates `pool_size` resources up front and lends them to workers one at
//! a time. Waiting workers park on a `parking_lot::Condvar`; nothing polls.
//!
//! A resource released as unhealthy (or failing the factory's liveness probe) is
//! destroyed and replaced on a background thread. The replacement only becomes
//! visible to `acquire` once it has been fully created, so the number of live
//! resources (`available + leased + replacing`) stays equal to the configured size.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::PoolConfig;

/// Unique identifier assigned to every resource the pool creates.
pub type ResourceId = u64;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error raised by a [`ResourceFactory`].
#[derive(Debug, thiserror::Error)]
#[error("{message}{}", source_suffix(.source.as_deref()))]
pub struct ResourceError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ResourceError {
    /// Create an error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

fn source_suffix(source: Option<&(dyn std::error::Error + Send + Sync + 'static)>) -> String {
    source.map(|s| format!(": {s}")).unwrap_or_default()
}

/// Lifecycle hooks for the resources a pool manages.
///
/// `create` is expected to be slow (launching a browser session, logging in).
/// `is_healthy` is the cheap liveness probe run on every release.
pub trait ResourceFactory: Send + Sync + 'static {
    /// The pooled resource type.
    type Resource: Send + 'static;

    /// Create a fresh resource.
    ///
    /// # Errors
    ///
    /// Returns a [`ResourceError`] when the resource cannot be created.
    fn create(&self) -> Result<Self::Resource, ResourceError>;

    /// Cheap liveness probe. Defaults to `true`.
    fn is_healthy(&self, _resource: &Self::Resource) -> bool {
        true
    }

    /// Tear a resource down. Errors are logged by the pool and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`ResourceError`] when teardown fails.
    fn destroy(&self, resource: Self::Resource) -> Result<(), ResourceError> {
        drop(resource);
        Ok(())
    }
}

/// Errors produced by the resource pool.
#[derive(Debug)]
pub enum PoolError {
    /// Configuration validation failed.
    InvalidConfig(String),

    /// A resource could not be created while filling the pool.
    Initialization {
        /// Resources successfully created (and since destroyed) before the failure.
        created: usize,
        /// Configured pool size.
        requested: usize,
        /// The factory error.
        source: ResourceError,
    },

    /// The pool has been shut down.
    Shutdown,

    /// Every slot has been lost to failed replacements; nothing can be acquired.
    Exhausted,

    /// No resource became available within the timeout.
    Timeout,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Initialization {
                created,
                requested,
                source,
            } => write!(
                f,
                "failed to create resource {} of {requested}: {source}",
                created + 1
            ),
            Self::Shutdown => write!(f, "pool has been shut down"),
            Self::Exhausted => write!(f, "pool has no remaining capacity"),
            Self::Timeout => write!(f, "timed out waiting for a resource"),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Initialization { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Snapshot of pool occupancy and lifetime counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Configured pool size.
    pub size: usize,
    /// Resources idle in the pool.
    pub available: usize,
    /// Resources currently held by workers.
    pub leased: usize,
    /// Replacements being created in the background.
    pub replacing: usize,
    /// Slots given up after every replacement attempt failed.
    pub lost: usize,
    /// Resources created, including replacements.
    pub created_total: u64,
    /// Successful replacements.
    pub replaced_total: u64,
    /// Resources destroyed.
    pub destroyed_total: u64,
    /// Whether `shutdown` has been called.
    pub shutdown: bool,
}

impl PoolStats {
    /// Resources that exist or are being created.
    #[must_use]
    pub const fn live(&self) -> usize {
        self.available + self.leased + self.replacing
    }
}

struct Slot<R> {
    id: ResourceId,
    resource: R,
}

struct PoolState<R> {
    available: VecDeque<Slot<R>>,
    leased: usize,
    replacing: usize,
    lost: usize,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct PoolCounters {
    created: AtomicU64,
    replaced: AtomicU64,
    destroyed: AtomicU64,
}

struct Shared<F: ResourceFactory> {
    factory: F,
    config: PoolConfig,
    state: Mutex<PoolState<F::Resource>>,
    /// Signaled whenever a resource enters the available set or capacity changes.
    available_cv: Condvar,
    counters: PoolCounters,
    next_id: AtomicU64,
    replacers: Mutex<Vec<JoinHandle<()>>>,
}

impl<F: ResourceFactory> Shared<F> {
    fn new(factory: F, config: PoolConfig) -> Self {
        Self {
            factory,
            config,
            state: Mutex::new(PoolState {
                available: VecDeque::new(),
                leased: 0,
                replacing: 0,
                lost: 0,
                shutdown: false,
            }),
            available_cv: Condvar::new(),
            counters: PoolCounters::default(),
            next_id: AtomicU64::new(1),
            replacers: Mutex::new(Vec::new()),
        }
    }

    fn create_slot(&self) -> Result<Slot<F::Resource>, ResourceError> {
        let resource = self.factory.create()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.counters.created.fetch_add(1, Ordering::Relaxed);
        debug!(resource_id = id, "resource created");
        Ok(Slot { id, resource })
    }

    fn destroy_slot(&self, slot: Slot<F::Resource>) {
        let id = slot.id;
        if let Err(e) = self.factory.destroy(slot.resource) {
            warn!(resource_id = id, error = %e, "failed to destroy resource");
        } else {
            debug!(resource_id = id, "resource destroyed");
        }
        self.counters.destroyed.fetch_add(1, Ordering::Relaxed);
    }

    fn release_slot(self: &Arc<Self>, slot: Slot<F::Resource>, healthy: bool) {
        // Probe outside the lock; skipped when the caller already flagged it.
        let healthy = healthy && self.factory.is_healthy(&slot.resource);

        let mut state = self.state.lock();
        state.leased = state.leased.saturating_sub(1);

        if state.shutdown {
            drop(state);
            debug!(resource_id = slot.id, "released after shutdown, destroying");
            self.destroy_slot(slot);
            return;
        }

        if healthy {
            state.available.push_back(slot);
            drop(state);
            self.available_cv.notify_one();
            return;
        }

        state.replacing += 1;
        drop(state);
        warn!(resource_id = slot.id, "resource unhealthy on release, replacing");
        self.spawn_replacement(slot);
    }

    fn spawn_replacement(self: &Arc<Self>, old: Slot<F::Resource>) {
        let old_id = old.id;
        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("harvest-replace-{old_id}"))
            .spawn(move || shared.replace(old));

        match spawned {
            Ok(handle) => {
                let mut replacers = self.replacers.lock();
                replacers.retain(|h| !h.is_finished());
                replacers.push(handle);
            }
            Err(e) => {
                error!(resource_id = old_id, error = %e, "failed to spawn replacement thread");
                self.give_up_slot();
            }
        }
    }

    /// Runs on the replacement thread.
    fn replace(&self, old: Slot<F::Resource>) {
        let old_id = old.id;
        self.destroy_slot(old);

        let attempts = self.config.replacement_attempts.max(1);
        for attempt in 1..=attempts {
            let mut state = self.state.lock();
            if state.shutdown {
                state.replacing = state.replacing.saturating_sub(1);
                drop(state);
                self.available_cv.notify_all();
                return;
            }
            drop(state);

            match self.create_slot() {
                Ok(slot) => {
                    self.counters.replaced.fetch_add(1, Ordering::Relaxed);
                    let mut state = self.state.lock();
                    state.replacing = state.replacing.saturating_sub(1);
                    if state.shutdown {
                        drop(state);
                        self.destroy_slot(slot);
                        self.available_cv.notify_all();
                        return;
                    }
                    info!(
                        replaced = old_id,
                        resource_id = slot.id,
                        attempt = attempt,
                        "replacement resource ready"
                    );
                    state.available.push_back(slot);
                    drop(state);
                    self.available_cv.notify_one();
                    return;
                }
                Err(e) => {
                    warn!(
                        replaced = old_id,
                        attempt = attempt,
                        attempts = attempts,
                        error = %e,
                        "replacement creation failed"
                    );
                    if attempt < attempts {
                        thread::sleep(self.config.replacement_backoff());
                    }
                }
            }
        }

        error!(
            replaced = old_id,
            "giving up on replacement, pool capacity reduced"
        );
        self.give_up_slot();
    }

    fn give_up_slot(&self) {
        let mut state = self.state.lock();
        state.replacing = state.replacing.saturating_sub(1);
        state.lost += 1;
        drop(state);
        // Waiters must re-check whether any capacity is left.
        self.available_cv.notify_all();
    }
}

impl<F: ResourceFactory> Drop for Shared<F> {
    fn drop(&mut self) {
        let drained: Vec<_> = self.state.get_mut().available.drain(..).collect();
        for slot in drained {
            self.destroy_slot(slot);
        }
    }
}

/// Exclusive lease on a pooled resource.
///
/// Dereferences to the resource. Call [`release`](Self::release) to hand it back;
/// dropping the guard releases it as healthy (the liveness probe still runs),
/// unless the drop happens while unwinding from a panic.
pub struct ResourceGuard<F: ResourceFactory> {
    slot: Option<Slot<F::Resource>>,
    shared: Arc<Shared<F>>,
}

impl<F: ResourceFactory> ResourceGuard<F> {
    /// Identifier of the leased resource.
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.slot.as_ref().map_or(0, |s| s.id)
    }

    /// Return the resource to the pool.
    ///
    /// With `healthy == false`, or when the liveness probe fails, the resource is
    /// destroyed and a replacement is created in the background.
    pub fn release(mut self, healthy: bool) {
        if let Some(slot) = self.slot.take() {
            self.shared.release_slot(slot, healthy);
        }
    }
}

impl<F: ResourceFactory> Deref for ResourceGuard<F> {
    type Target = F::Resource;

    fn deref(&self) -> &Self::Target {
        match &self.slot {
            Some(slot) => &slot.resource,
            None => unreachable!("resource guard used after release"),
        }
    }
}

impl<F: ResourceFactory> DerefMut for ResourceGuard<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.slot {
            Some(slot) => &mut slot.resource,
            None => unreachable!("resource guard used after release"),
        }
    }
}

impl<F: ResourceFactory> Drop for ResourceGuard<F> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            // A lease unwound by a panic is not trusted.
            let healthy = !std::thread::panicking();
            debug!(resource_id = slot.id, healthy, "guard dropped without explicit release");
            self.shared.release_slot(slot, healthy);
        }
    }
}

impl<F: ResourceFactory> fmt::Debug for ResourceGuard<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceGuard").field("id", &self.id()).finish()
    }
}

/// Fixed-size pool of expensive resources shared by concurrent workers.
///
/// Cloning the pool is cheap and yields another handle to the same resources.
pub struct ResourcePool<F: ResourceFactory> {
    shared: Arc<Shared<F>>,
}

impl<F: ResourceFactory> Clone for ResourcePool<F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F: ResourceFactory> ResourcePool<F> {
    /// Create `config.pool_size` resources, one at a time.
    ///
    /// If any creation fails, every resource created so far is destroyed and no
    /// pool is returned.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidConfig` if the configuration is invalid
    /// - `PoolError::Initialization` if the factory fails
    pub fn initialize(factory: F, config: PoolConfig) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let requested = config.pool_size;
        let shared = Shared::new(factory, config);
        info!(pool_size = requested, "initializing resource pool");

        let mut created = Vec::with_capacity(requested);
        for index in 0..requested {
            match shared.create_slot() {
                Ok(slot) => created.push(slot),
                Err(source) => {
                    error!(
                        index = index,
                        pool_size = requested,
                        error = %source,
                        "resource creation failed, tearing down partial pool"
                    );
                    for slot in created {
                        shared.destroy_slot(slot);
                    }
                    return Err(PoolError::Initialization {
                        created: index,
                        requested,
                        source,
                    });
                }
            }
        }

        shared.state.lock().available.extend(created);
        info!(pool_size = requested, "resource pool ready");

        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// Block until a resource is available.
    ///
    /// # Errors
    ///
    /// - `PoolError::Shutdown` if the pool is (or gets) shut down
    /// - `PoolError::Exhausted` if every slot has been lost
    pub fn acquire(&self) -> Result<ResourceGuard<F>, PoolError> {
        self.acquire_until(None)
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// As `acquire`, plus `PoolError::Timeout`.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<ResourceGuard<F>, PoolError> {
        self.acquire_until(Some(Instant::now() + timeout))
    }

    /// Take an idle resource without waiting.
    #[must_use]
    pub fn try_acquire(&self) -> Option<ResourceGuard<F>> {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return None;
        }
        let slot = state.available.pop_front()?;
        state.leased += 1;
        drop(state);
        Some(self.lease(slot))
    }

    fn acquire_until(&self, deadline: Option<Instant>) -> Result<ResourceGuard<F>, PoolError> {
        let mut state = self.shared.state.lock();
        loop {
            if state.shutdown {
                return Err(PoolError::Shutdown);
            }
            if let Some(slot) = state.available.pop_front() {
                state.leased += 1;
                drop(state);
                return Ok(self.lease(slot));
            }
            if state.leased == 0 && state.replacing == 0 {
                return Err(PoolError::Exhausted);
            }
            match deadline {
                Some(deadline) => {
                    let timed_out = self
                        .shared
                        .available_cv
                        .wait_until(&mut state, deadline)
                        .timed_out();
                    let exhausted = state.leased == 0 && state.replacing == 0;
                    if timed_out && state.available.is_empty() && !state.shutdown && !exhausted {
                        return Err(PoolError::Timeout);
                    }
                }
                None => self.shared.available_cv.wait(&mut state),
            }
        }
    }

    fn lease(&self, slot: Slot<F::Resource>) -> ResourceGuard<F> {
        debug!(resource_id = slot.id, "resource acquired");
        ResourceGuard {
            slot: Some(slot),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Return a leased resource; equivalent to `guard.release(healthy)`.
    pub fn release(&self, guard: ResourceGuard<F>, healthy: bool) {
        guard.release(healthy);
    }

    /// Destroy every idle resource and refuse further leases.
    ///
    /// Resources still leased are destroyed when released. Destruction errors are
    /// logged and swallowed. Waits for in-flight replacements to finish.
    pub fn shutdown(&self) {
        let drained: Vec<_> = {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            state.available.drain(..).collect()
        };
        self.shared.available_cv.notify_all();

        info!(idle = drained.len(), "shutting down resource pool");
        for slot in drained {
            self.shared.destroy_slot(slot);
        }

        let replacers = std::mem::take(&mut *self.shared.replacers.lock());
        for handle in replacers {
            if handle.join().is_err() {
                warn!("replacement thread panicked");
            }
        }
        info!("resource pool shut down");
    }

    /// Configured pool size.
    #[must_use]
    pub fn size(&self) -> usize {
        self.shared.config.pool_size
    }

    /// Resources that currently exist or are being created.
    #[must_use]
    pub fn live(&self) -> usize {
        let state = self.shared.state.lock();
        state.available.len() + state.leased + state.replacing
    }

    /// Whether `shutdown` has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// The factory backing this pool.
    #[must_use]
    pub fn factory(&self) -> &F {
        &self.shared.factory
    }

    /// Current occupancy and lifetime counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            size: self.shared.config.pool_size,
            available: state.available.len(),
            leased: state.leased,
            replacing: state.replacing,
            lost: state.lost,
            created_total: self.shared.counters.created.load(Ordering::Relaxed),
            replaced_total: self.shared.counters.replaced.load(Ordering::Relaxed),
            destroyed_total: self.shared.counters.destroyed.load(Ordering::Relaxed),
            shutdown: state.shutdown,
        }
    }
}

impl<F: ResourceFactory> fmt::Debug for ResourcePool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("stats", &self.stats())
            .finish()
    }
}
