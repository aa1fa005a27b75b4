//! The persisted application record.

use serde::{Deserialize, Serialize};

use super::{BlobStore, Settings};
use crate::error::Result;
use crate::stats::{AchievementBook, Statistics};
use crate::task::TaskList;

/// Fixed key of the application record in the [`BlobStore`].
pub const STATE_KEY: &str = "zomodoro-data";

/// Everything that survives a restart, written as one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppData {
    pub settings: Settings,
    pub tasks: TaskList,
    pub statistics: Statistics,
    pub achievements: AchievementBook,
    pub session_count: u32,
    pub completed_pomodoros: u32,
}

impl AppData {
    /// Parse a stored record. Missing sections take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut data: AppData = serde_json::from_str(json)?;
        let saved: Vec<_> = data.achievements.iter().cloned().collect();
        data.achievements = AchievementBook::merge_saved(&saved);
        Ok(data)
    }

    /// Read the record, falling back to defaults when it is missing,
    /// unreadable or corrupt. Never fails.
    pub fn load(store: &dyn BlobStore) -> Self {
        match store.read(STATE_KEY) {
            Ok(Some(json)) => match Self::from_json(&json) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(error = %e, "discarding corrupt saved state");
                    Self::default()
                }
            },
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::warn!(error = %e, "could not read saved state, using defaults");
                Self::default()
            }
        }
    }

    /// Overwrite the stored record with this state.
    ///
    /// # Errors
    /// Returns an error if serialization or the store write fails.
    pub fn save(&self, store: &dyn BlobStore) -> Result<()> {
        let json = serde_json::to_string(self)?;
        store.write(STATE_KEY, &json)?;
        Ok(())
    }
}
