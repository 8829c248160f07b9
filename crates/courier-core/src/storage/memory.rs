//! In-memory backend, used by tests and the `memory` storage mode.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use super::StateStore;
use crate::store::Store;
use crate::Result;

/// Keeps the latest snapshot in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Store>,
    saves: AtomicU64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing store
    #[must_use]
    pub fn with_store(store: Store) -> Self {
        Self {
            snapshot: Mutex::new(store),
            saves: AtomicU64::new(0),
        }
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Store {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, store: &Store) -> Result<()> {
        *self
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = store.clone();
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
