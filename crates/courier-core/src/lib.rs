//! courier-core - Core library for Courier
//!
//! This crate contains the message model, the in-memory store, the
//! last-write-wins merge and delta algorithms, and the storage backends
//! used by the Courier HTTP service.

pub mod error;
pub mod models;
pub mod storage;
pub mod store;
pub mod sync;

pub use error::{Error, Result};
pub use models::{Message, EPOCH_TIMESTAMP};
pub use storage::{JsonFileStore, MemoryStore, StateStore};
pub use store::Store;
pub use sync::{delta, merge, MergeReport, SyncEngine, SyncOutcome};
