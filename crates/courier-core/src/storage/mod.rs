//! Durable storage backends for the message store.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::store::Store;
use crate::Result;

/// Loads and saves whole store snapshots.
///
/// `load` never fails: missing or unreadable state is an empty store. `save`
/// must replace the previous snapshot atomically or leave it untouched.
pub trait StateStore: Send + Sync {
    /// Load the latest durable snapshot
    fn load(&self) -> Store;

    /// Replace the durable snapshot with `store`
    fn save(&self, store: &Store) -> Result<()>;

    /// Short backend name for logs and health output
    fn kind(&self) -> &'static str;
}
