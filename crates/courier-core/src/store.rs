//! In-memory message store
//!
//! The store is rebuilt from a durable snapshot at the start of every sync and
//! written back at the end. Messages are kept in insertion order (the first
//! time an id was seen), which is the order reported by [`Store::all`] and
//! therefore by `delta`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Message;
use crate::Result;

/// Authoritative set of messages, at most one per id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Store {
    messages: Vec<Message>,
    index: HashMap<String, usize>,
}

/// Persisted layout: `{ "messages": [ ... ] }`
#[derive(Deserialize)]
struct Snapshot {
    #[serde(default)]
    messages: Vec<Value>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    messages: &'a [Message],
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the stored message for an id
    pub fn find(&self, id: &str) -> Option<&Message> {
        self.index.get(id).map(|&position| &self.messages[position])
    }

    /// Insert the message under `id`, replacing any stored message in place
    pub fn upsert(&mut self, id: &str, message: Message) {
        if let Some(&position) = self.index.get(id) {
            self.messages[position] = message;
        } else {
            self.index.insert(id.to_string(), self.messages.len());
            self.messages.push(message);
        }
    }

    /// Insert the message only when its id is not stored yet.
    ///
    /// Returns `false` for a known id or a message without a usable id.
    pub fn insert_if_absent(&mut self, message: Message) -> bool {
        let Some(id) = message.key().map(str::to_string) else {
            return false;
        };
        if self.index.contains_key(&id) {
            return false;
        }
        self.upsert(&id, message);
        true
    }

    /// Every stored message, in insertion order
    pub fn all(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Consume the store, yielding messages in insertion order
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Decode a persisted snapshot.
    ///
    /// Records that are not message objects or have no id are dropped one
    /// at a time, so a bad record never costs the rest of the snapshot. When
    /// a snapshot repeats an id the first record is kept.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_slice(bytes)?;
        let total = snapshot.messages.len();
        let store = Self::from(
            snapshot
                .messages
                .into_iter()
                .filter_map(|value| Message::try_from(value).ok())
                .collect::<Vec<_>>(),
        );
        if store.len() < total {
            tracing::warn!(
                total,
                kept = store.len(),
                "Dropped malformed, id-less or duplicate records from snapshot"
            );
        }
        Ok(store)
    }

    /// Encode the store as a pretty-printed snapshot
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let snapshot = SnapshotRef {
            messages: &self.messages,
        };
        Ok(serde_json::to_vec_pretty(&snapshot)?)
    }
}

impl From<Vec<Message>> for Store {
    fn from(messages: Vec<Message>) -> Self {
        let mut store = Self::new();
        for message in messages {
            store.insert_if_absent(message);
        }
        store
    }
}
