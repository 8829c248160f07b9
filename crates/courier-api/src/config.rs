use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_DB_PATH: &str = "db.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// JSON snapshot file at the given path
    File(PathBuf),
    /// Process memory; state is lost on restart
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub storage: StorageBackend,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = match optional_trimmed(&lookup, "COURIER_API_BIND_ADDR") {
            Some(bind_addr) => bind_addr,
            None => match optional_trimmed(&lookup, "PORT") {
                Some(port) => {
                    let port = port.parse::<u16>().map_err(|_| {
                        ConfigError::Invalid("PORT must be an integer in [0, 65535]".to_string())
                    })?;
                    format!("0.0.0.0:{port}")
                }
                None => DEFAULT_BIND_ADDR.to_string(),
            },
        };

        let storage = match value_or_default(&lookup, "COURIER_STORAGE", "file")
            .to_ascii_lowercase()
            .as_str()
        {
            "file" => StorageBackend::File(PathBuf::from(value_or_default(
                &lookup,
                "COURIER_DB_PATH",
                DEFAULT_DB_PATH,
            ))),
            "memory" => StorageBackend::Memory,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "COURIER_STORAGE must be `file` or `memory`, got `{other}`"
                )))
            }
        };

        Ok(Self { bind_addr, storage })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
