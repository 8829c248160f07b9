//! Message model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Earliest possible timestamp. Stands in for a missing or empty timestamp
/// and for a missing sync watermark.
pub const EPOCH_TIMESTAMP: &str = "1970-01-01T00:00:00.000Z";

/// A message as exchanged with clients and kept in the store.
///
/// Only `id`, `timestamp` and `isSynced` carry meaning for sync. Every other
/// field is kept in `payload` and written back exactly as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Creator-assigned identifier, the sole merge key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// ISO-8601 UTC "last modified at" stamp, compared as text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Set to `true` by the server once the message has been merged. Any
    /// value a client sends is carried verbatim and never trusted.
    #[serde(
        rename = "isSynced",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub is_synced: Option<Value>,
    /// Opaque fields (content, author, ...)
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Message {
    /// Create a message with an id and timestamp and no payload
    #[must_use]
    pub fn new(id: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            timestamp: Some(timestamp.into()),
            is_synced: None,
            payload: Map::new(),
        }
    }

    /// Add an opaque payload field
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(name.into(), value.into());
        self
    }

    /// The merge key, or `None` when the id is missing or empty
    pub fn key(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// The timestamp used for ordering, with [`EPOCH_TIMESTAMP`] substituted
    /// for a missing or empty value
    pub fn effective_timestamp(&self) -> &str {
        self.timestamp
            .as_deref()
            .filter(|timestamp| !timestamp.is_empty())
            .unwrap_or(EPOCH_TIMESTAMP)
    }

    /// Strict textual comparison of effective timestamps. Equal stamps are
    /// not newer.
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.effective_timestamp() > other.effective_timestamp()
    }

    pub fn is_synced(&self) -> bool {
        matches!(self.is_synced, Some(Value::Bool(true)))
    }

    pub fn mark_synced(&mut self) {
        self.is_synced = Some(Value::Bool(true));
    }
}

impl TryFrom<Value> for Message {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::InvalidInput(
                "message must be a JSON object".to_string(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }
}
