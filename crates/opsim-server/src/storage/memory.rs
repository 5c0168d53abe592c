//! In-memory storage for tests.

use std::sync::{Arc, Mutex, PoisonError};

use opsim_core::{DomainMap, PersistError, Persistence, TrafficRecord};

#[derive(Default)]
struct MemoryInner {
    state: Option<DomainMap>,
    traffic: Vec<TrafficRecord>,
}

/// Storage that keeps everything in memory. Clones share state via Arc, so a
/// test can hand a clone to the simulator and inspect writes afterwards.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage pre-seeded with a snapshot, as if a previous run had
    /// persisted it.
    #[must_use]
    pub fn with_snapshot(domains: DomainMap) -> Self {
        let storage = Self::new();
        storage.lock().state = Some(domains);
        storage
    }

    /// Number of appended traffic records.
    #[must_use]
    pub fn traffic_len(&self) -> usize {
        self.lock().traffic.len()
    }

    /// The stored snapshot, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<DomainMap> {
        self.lock().state.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Persistence for MemoryStorage {
    fn load_state(&self) -> Result<Option<DomainMap>, PersistError> {
        Ok(self.lock().state.clone())
    }

    fn save_state(&self, domains: &DomainMap) -> Result<(), PersistError> {
        self.lock().state = Some(domains.clone());
        Ok(())
    }

    fn append_traffic(&self, record: &TrafficRecord) -> Result<(), PersistError> {
        self.lock().traffic.push(record.clone());
        Ok(())
    }
}
