mod config;
pub mod database;
mod state;

pub use config::Settings;
pub use database::Database;
pub use state::{AppData, STATE_KEY};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::DatabaseError;

/// Returns the data directory, creating it if needed.
///
/// `ZOMODORO_DATA_DIR` wins when set. Otherwise `~/.config/zomodoro[-dev]/`
/// based on `ZOMODORO_ENV` (set `ZOMODORO_ENV=dev` for the development
/// directory).
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = match std::env::var_os("ZOMODORO_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("ZOMODORO_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("zomodoro-dev")
            } else {
                base_dir.join("zomodoro")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// A store of opaque string records.
///
/// The core keeps its whole state in one record and overwrites it on every
/// save; implementations need no merge or partial-update support.
pub trait BlobStore: Send {
    fn read(&self, key: &str) -> Result<Option<String>, DatabaseError>;
    fn write(&self, key: &str, value: &str) -> Result<(), DatabaseError>;
}

impl<S: BlobStore + Sync + ?Sized> BlobStore for Arc<S> {
    fn read(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        (**self).write(key, value)
    }
}

/// Volatile [`BlobStore`] for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a record.
    pub fn with_record(key: &str, value: &str) -> Self {
        let store = Self::new();
        if let Ok(mut records) = store.records.lock() {
            records.insert(key.to_string(), value.to_string());
        }
        store
    }
}

impl BlobStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let records = self.records.lock().map_err(|_| DatabaseError::Locked)?;
        Ok(records.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        let mut records = self.records.lock().map_err(|_| DatabaseError::Locked)?;
        records.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
