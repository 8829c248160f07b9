//! JSON snapshot file backend.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::StateStore;
use crate::store::Store;
use crate::{Error, Result};

/// Stores the whole message set as one pretty-printed JSON file.
///
/// Saves go through a sibling `.tmp` file that is fsynced and renamed over
/// the snapshot, so readers only ever see a complete file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling_path(&self, suffix: &str) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map_or_else(|| "db.json".into(), |name| name.to_string_lossy());
        self.path.with_file_name(format!("{file_name}{suffix}"))
    }

    /// Move an unreadable snapshot aside so the next save cannot overwrite it
    fn quarantine_corrupted_snapshot(&self) -> Result<PathBuf> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let backup_path = self.sibling_path(&format!(".corrupt-{timestamp}"));
        fs::rename(&self.path, &backup_path)?;
        Ok(backup_path)
    }

    fn write_snapshot(&self, temp_path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = File::create(temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(temp_path, &self.path)
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Store {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No snapshot yet, starting empty");
                return Store::new();
            }
            Err(error) => {
                tracing::warn!(
                    path = %self.path.display(),
                    %error,
                    "Failed to read snapshot, starting empty"
                );
                return Store::new();
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Store::new();
        }

        match Store::from_json(&bytes) {
            Ok(store) => store,
            Err(error) => {
                tracing::warn!(
                    path = %self.path.display(),
                    %error,
                    "Snapshot is corrupt, starting empty"
                );
                match self.quarantine_corrupted_snapshot() {
                    Ok(backup_path) => tracing::warn!(
                        "Moved corrupt snapshot from {} to {}",
                        self.path.display(),
                        backup_path.display()
                    ),
                    Err(error) => tracing::warn!(
                        path = %self.path.display(),
                        %error,
                        "Failed to quarantine corrupt snapshot"
                    ),
                }
                Store::new()
            }
        }
    }

    fn save(&self, store: &Store) -> Result<()> {
        let bytes = store.to_json()?;
        let temp_path = self.sibling_path(".tmp");

        self.write_snapshot(&temp_path, &bytes).map_err(|error| {
            let _ = fs::remove_file(&temp_path);
            tracing::error!(path = %self.path.display(), %error, "Failed to write snapshot");
            Error::Storage(format!(
                "failed to write snapshot {}: {error}",
                self.path.display()
            ))
        })?;

        tracing::debug!(
            path = %self.path.display(),
            messages = store.len(),
            bytes = bytes.len(),
            "Saved snapshot"
        );
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}
