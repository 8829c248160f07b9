//! Last-write-wins merge and watermark delta.
//!
//! A sync round-trip is `merge` followed by `delta` against the same store.
//! Both are pure functions of the store and their inputs; persistence and
//! locking live in [`SyncEngine`].
//!
//! Conflicts are resolved per whole record: when a client copy has a strictly
//! greater timestamp it replaces every field of the stored copy, otherwise
//! the stored copy is kept untouched. Equal timestamps keep the stored copy.

mod engine;

pub use engine::{SyncEngine, SyncOutcome};

use serde::Serialize;

use crate::models::{Message, EPOCH_TIMESTAMP};
use crate::store::Store;

/// What a merge did with each client record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Records whose id was new to the store
    pub inserted: usize,
    /// Records that replaced an older stored copy
    pub replaced: usize,
    /// Records discarded because the stored copy was as new or newer
    pub kept: usize,
    /// Records without a usable id
    pub skipped: usize,
}

impl MergeReport {
    /// Number of records that changed the store
    pub const fn changed(&self) -> usize {
        self.inserted + self.replaced
    }
}

/// Merge client messages into the store, in input order.
///
/// Every merged record is marked synced before it is compared. Records
/// without an id are skipped; nothing here fails.
pub fn merge(store: &mut Store, client_messages: impl IntoIterator<Item = Message>) -> MergeReport {
    let mut report = MergeReport::default();

    for mut local in client_messages {
        let Some(id) = local.key().map(str::to_string) else {
            report.skipped += 1;
            continue;
        };
        local.mark_synced();

        match store.find(&id).map(|server| local.is_newer_than(server)) {
            None => {
                store.upsert(&id, local);
                report.inserted += 1;
            }
            Some(true) => {
                store.upsert(&id, local);
                report.replaced += 1;
            }
            Some(false) => report.kept += 1,
        }
    }

    report
}

/// Messages the client has not seen: every stored message whose timestamp is
/// strictly greater than `watermark`, in store order.
///
/// A missing or empty watermark means the epoch, so the whole store is
/// returned.
pub fn delta(store: &Store, watermark: Option<&str>) -> Vec<Message> {
    let watermark = watermark
        .filter(|watermark| !watermark.is_empty())
        .unwrap_or(EPOCH_TIMESTAMP);

    store
        .all()
        .filter(|message| message.effective_timestamp() > watermark)
        .cloned()
        .collect()
}
