//! Serialized load/merge/save cycles against a storage backend.

use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use super::{delta, merge, MergeReport};
use crate::models::Message;
use crate::storage::StateStore;
use crate::{Error, Result};

/// Result of one sync round-trip
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncOutcome {
    pub report: MergeReport,
    /// Stored messages newer than the client's watermark
    pub server_messages: Vec<Message>,
}

/// Runs sync requests against a storage backend.
///
/// Every storage access runs while holding one lock. Sync and
/// single-message submission load, mutate and save as one step, so
/// concurrent requests cannot overwrite each other's merges. Reads take the
/// same lock because loading may move a corrupt snapshot aside.
pub struct SyncEngine {
    storage: Box<dyn StateStore>,
    lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(storage: impl StateStore + 'static) -> Self {
        Self {
            storage: Box::new(storage),
            lock: Mutex::new(()),
        }
    }

    pub fn storage_kind(&self) -> &'static str {
        self.storage.kind()
    }

    /// Every stored message, in store order
    pub fn messages(&self) -> Result<Vec<Message>> {
        let _guard = self.lock()?;
        Ok(self.storage.load().into_messages())
    }

    /// Merge the client batch, persist, and return what the client is missing
    /// relative to `watermark`.
    pub fn sync(
        &self,
        client_messages: Vec<Message>,
        watermark: Option<&str>,
    ) -> Result<SyncOutcome> {
        let _guard = self.lock()?;
        let mut store = self.storage.load();

        let report = merge(&mut store, client_messages);
        let server_messages = delta(&store, watermark);
        self.storage.save(&store)?;

        tracing::info!(
            inserted = report.inserted,
            replaced = report.replaced,
            kept = report.kept,
            skipped = report.skipped,
            returned = server_messages.len(),
            stored = store.len(),
            "Merged client batch"
        );

        Ok(SyncOutcome {
            report,
            server_messages,
        })
    }

    /// Store a single message unless its id is already known.
    ///
    /// Returns `true` when the message was inserted. A known id leaves the
    /// store and the durable snapshot untouched.
    pub fn submit(&self, message: Message) -> Result<bool> {
        let Some(id) = message.key().map(str::to_string) else {
            return Err(Error::InvalidInput("invalid message".to_string()));
        };

        let _guard = self.lock()?;
        let mut store = self.storage.load();
        if !store.insert_if_absent(message) {
            tracing::debug!(id, "Message already stored, skipping insert");
            return Ok(false);
        }
        self.storage.save(&store)?;

        tracing::info!(id, stored = store.len(), "Stored submitted message");
        Ok(true)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|e| Error::Storage(format!("Sync lock poisoned: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::storage::{JsonFileStore, MemoryStore};
    use crate::store::Store;
    use crate::EPOCH_TIMESTAMP;

    /// Widens the load/save window so unserialized cycles would collide.
    struct SlowStore(Arc<MemoryStore>);

    impl StateStore for SlowStore {
        fn load(&self) -> Store {
            let store = self.0.load();
            thread::sleep(Duration::from_millis(5));
            store
        }

        fn save(&self, store: &Store) -> Result<()> {
            self.0.save(store)
        }

        fn kind(&self) -> &'static str {
            "slow"
        }
    }

    /// Records the highest number of storage calls seen running at once.
    #[derive(Default)]
    struct OverlapStore {
        inner: MemoryStore,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl OverlapStore {
        fn enter(&self) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
        }

        fn leave(&self) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl StateStore for Arc<OverlapStore> {
        fn load(&self) -> Store {
            self.enter();
            let store = self.inner.load();
            self.leave();
            store
        }

        fn save(&self, store: &Store) -> Result<()> {
            self.enter();
            let result = self.inner.save(store);
            self.leave();
            result
        }

        fn kind(&self) -> &'static str {
            "overlap"
        }
    }

    struct SharedStore(Arc<MemoryStore>);

    impl StateStore for SharedStore {
        fn load(&self) -> Store {
            self.0.load()
        }

        fn save(&self, store: &Store) -> Result<()> {
            self.0.save(store)
        }

        fn kind(&self) -> &'static str {
            self.0.kind()
        }
    }

    struct FailingStore;

    impl StateStore for FailingStore {
        fn load(&self) -> Store {
            Store::new()
        }

        fn save(&self, _store: &Store) -> Result<()> {
            Err(Error::Storage("disk full".to_string()))
        }

        fn kind(&self) -> &'static str {
            "failing"
        }
    }

    #[test]
    fn test_sync_persists_and_returns_delta() {
        let backend = Arc::new(MemoryStore::new());
        let engine = SyncEngine::new(SharedStore(Arc::clone(&backend)));

        let outcome = engine
            .sync(
                vec![Message::new("a", "2024-01-01T00:00:00Z").with_field("text", "hi")],
                Some(EPOCH_TIMESTAMP),
            )
            .unwrap();

        assert_eq!(outcome.report.inserted, 1);
        assert_eq!(outcome.server_messages.len(), 1);
        assert_eq!(backend.save_count(), 1);
        assert_eq!(engine.messages().unwrap(), outcome.server_messages);
    }

    #[test]
    fn test_sync_against_file_storage_survives_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");

        SyncEngine::new(JsonFileStore::new(&path))
            .sync(vec![Message::new("a", "2024-01-01T00:00:00Z")], None)
            .unwrap();

        let engine = SyncEngine::new(JsonFileStore::new(&path));
        let outcome = engine
            .sync(vec![Message::new("b", "2024-01-02T00:00:00Z")], None)
            .unwrap();
        let ids: Vec<_> = outcome
            .server_messages
            .iter()
            .filter_map(Message::key)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_submit_skips_known_ids_without_saving() {
        let backend = Arc::new(MemoryStore::new());
        let engine = SyncEngine::new(SharedStore(Arc::clone(&backend)));

        assert!(engine
            .submit(Message::new("a", "1").with_field("text", "first"))
            .unwrap());
        assert!(!engine
            .submit(Message::new("a", "9").with_field("text", "second"))
            .unwrap());

        assert_eq!(backend.save_count(), 1);
        let stored = engine.messages().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].payload.get("text"), Some(&json!("first")));
        // Submission is not a merge, so the flag is left as sent.
        assert!(!stored[0].is_synced());
    }

    #[test]
    fn test_submit_rejects_missing_id() {
        let engine = SyncEngine::new(MemoryStore::new());
        let err = engine.submit(Message::new("", "1")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_save_failure_is_surfaced() {
        let engine = SyncEngine::new(FailingStore);
        let err = engine
            .sync(vec![Message::new("a", "1")], None)
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_concurrent_syncs_do_not_lose_merges() {
        let backend = Arc::new(MemoryStore::new());
        let engine = SyncEngine::new(SlowStore(Arc::clone(&backend)));

        thread::scope(|scope| {
            for worker in 0..8 {
                let engine = &engine;
                scope.spawn(move || {
                    let id = format!("m-{worker}");
                    engine
                        .sync(vec![Message::new(id, "2024-01-01T00:00:00Z")], None)
                        .unwrap();
                });
            }
        });

        assert_eq!(backend.load().len(), 8);
        assert_eq!(backend.save_count(), 8);
    }

    #[test]
    fn test_reads_never_overlap_writes() {
        let backend = Arc::new(OverlapStore::default());
        let engine = SyncEngine::new(Arc::clone(&backend));

        thread::scope(|scope| {
            for worker in 0..6 {
                let engine = &engine;
                scope.spawn(move || {
                    if worker % 2 == 0 {
                        engine.messages().unwrap();
                    } else {
                        let id = format!("m-{worker}");
                        engine
                            .sync(vec![Message::new(id, "2024-01-01T00:00:00Z")], None)
                            .unwrap();
                    }
                });
            }
        });

        assert_eq!(backend.peak.load(Ordering::SeqCst), 1);
        assert_eq!(backend.inner.load().len(), 3);
    }
}
