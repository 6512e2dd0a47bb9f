//! In-memory progress backend for tests and dry runs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{ProgressBackend, ProgressRecord, StoreError};

/// Backend keeping the record in memory.
///
/// Clones share state, so a test can keep one handle to inspect writes or
/// inject failures while the store owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    record: Arc<Mutex<Option<ProgressRecord>>>,
    fail_writes: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryBackend {
    /// Empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-populated with `record`.
    #[must_use]
    pub fn with_record(record: ProgressRecord) -> Self {
        let backend = Self::default();
        *backend.record.lock() = Some(record);
        backend
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Last successfully written record.
    #[must_use]
    pub fn stored(&self) -> Option<ProgressRecord> {
        self.record.lock().clone()
    }

    /// Number of successful writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl ProgressBackend for InMemoryBackend {
    fn read(&self) -> Result<Option<ProgressRecord>, StoreError> {
        Ok(self.record.lock().clone())
    }

    fn write(&mut self, record: &ProgressRecord) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".into()));
        }
        *self.record.lock() = Some(record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".into()
    }
}
