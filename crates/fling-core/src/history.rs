//! Transfer history tracking for Fling.
//!
//! Every completed or failed file transfer is appended here, newest
//! first, and persisted as JSON. The UI layers read it to show past
//! transfers; the engine only ever appends.

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::HistoryConfig;
use crate::error::{Error, Result};

/// Which role this device played in the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The file left this device
    Sent,
    /// The file arrived on this device
    Received,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::Received => write!(f, "received"),
        }
    }
}

/// Outcome of the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// All bytes arrived
    Success,
    /// The transfer errored partway
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A single per-file history record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique identifier
    pub id: Uuid,
    /// Unix timestamp when the transfer finished
    pub timestamp: u64,
    /// File name
    pub file_name: String,
    /// File size in bytes
    pub file_size: u64,
    /// MIME type or platform type tag
    pub kind: String,
    /// Role this device played
    pub role: Role,
    /// Final outcome
    pub status: Outcome,
}

impl HistoryEntry {
    /// Create a record with the current timestamp.
    #[must_use]
    pub fn new(file_name: String, file_size: u64, kind: String, role: Role, status: Outcome) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            id: Uuid::new_v4(),
            timestamp,
            file_name,
            file_size,
            kind,
            role,
            status,
        }
    }

    /// Timestamp as a human-readable string.
    #[must_use]
    pub fn formatted_timestamp(&self) -> String {
        use chrono::{DateTime, Utc};
        let timestamp_i64 = i64::try_from(self.timestamp).unwrap_or(i64::MAX);
        DateTime::<Utc>::from_timestamp(timestamp_i64, 0).map_or_else(
            || "unknown".to_string(),
            |dt| dt.format("%Y-%m-%d %H:%M").to_string(),
        )
    }
}

/// Serializable wrapper for the history file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryDatabase {
    version: u32,
    entries: Vec<HistoryEntry>,
}

/// Transfer history store.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    entries: Vec<HistoryEntry>,
    config: HistoryConfig,
}

impl HistoryStore {
    /// Load the store from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be parsed.
    pub fn load() -> Result<Self> {
        let path = Self::default_path().unwrap_or_else(|| PathBuf::from("history.json"));
        Self::load_from(path, HistoryConfig::default())
    }

    /// Load from a specific path with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be parsed.
    pub fn load_from(path: PathBuf, config: HistoryConfig) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                path,
                entries: Vec::new(),
                config,
            });
        }

        let file = fs::File::open(&path).map_err(|e| {
            Error::Config(format!("failed to open history at {}: {e}", path.display()))
        })?;
        let reader = BufReader::new(file);
        let db: HistoryDatabase = serde_json::from_reader(reader).map_err(|e| {
            Error::Config(format!("failed to parse history at {}: {e}", path.display()))
        })?;

        let mut store = Self {
            path,
            entries: db.entries,
            config,
        };
        store.apply_auto_clear();
        Ok(store)
    }

    /// The default history file path for this platform.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("sh", "fling", "Fling")
            .map(|dirs| dirs.data_dir().join("history.json"))
    }

    /// Persist the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Config(format!(
                    "failed to create history directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let db = HistoryDatabase {
            version: 1,
            entries: self.entries.clone(),
        };
        let file = fs::File::create(&self.path).map_err(|e| {
            Error::Config(format!(
                "failed to create history at {}: {e}",
                self.path.display()
            ))
        })?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &db).map_err(|e| {
            Error::Config(format!(
                "failed to write history at {}: {e}",
                self.path.display()
            ))
        })?;
        Ok(())
    }

    /// Append an entry (newest first) and persist.
    ///
    /// Does nothing when history is disabled in the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be saved.
    pub fn add(&mut self, entry: HistoryEntry) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        self.entries.insert(0, entry);
        if self.entries.len() > self.config.max_entries {
            self.entries.truncate(self.config.max_entries);
        }
        self.save()
    }

    /// List entries, newest first.
    #[must_use]
    pub fn list(&self, limit: Option<usize>) -> &[HistoryEntry] {
        limit.map_or_else(
            || &self.entries[..],
            |n| &self.entries[..n.min(self.entries.len())],
        )
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all entries and persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be saved.
    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.save()
    }

    fn apply_auto_clear(&mut self) {
        if let Some(days) = self.config.auto_clear_days {
            let cutoff = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs()
                .saturating_sub(Duration::from_secs(u64::from(days) * 24 * 60 * 60).as_secs());

            let len_before = self.entries.len();
            self.entries.retain(|e| e.timestamp >= cutoff);
            if self.entries.len() < len_before {
                tracing::debug!(
                    removed = len_before - self.entries.len(),
                    "auto-cleared old history entries"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(name: &str) -> HistoryEntry {
        HistoryEntry::new(
            name.to_string(),
            1024,
            "text/plain".to_string(),
            Role::Sent,
            Outcome::Success,
        )
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");

        let mut store = HistoryStore::load_from(path.clone(), HistoryConfig::default()).unwrap();
        store.add(entry("a.txt")).unwrap();
        store.add(entry("b.txt")).unwrap();

        let loaded = HistoryStore::load_from(path, HistoryConfig::default()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.list(None)[0].file_name, "b.txt");
    }

    #[test]
    fn test_max_entries_cap() {
        let dir = TempDir::new().unwrap();
        let config = HistoryConfig {
            enabled: true,
            max_entries: 2,
            auto_clear_days: None,
        };
        let mut store = HistoryStore::load_from(dir.path().join("h.json"), config).unwrap();
        store.add(entry("one")).unwrap();
        store.add(entry("two")).unwrap();
        store.add(entry("three")).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.list(None)[0].file_name, "three");
    }

    #[test]
    fn test_disabled_history_skips_append() {
        let dir = TempDir::new().unwrap();
        let config = HistoryConfig {
            enabled: false,
            max_entries: 10,
            auto_clear_days: None,
        };
        let mut store = HistoryStore::load_from(dir.path().join("h.json"), config).unwrap();
        store.add(entry("skipped")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let mut store =
            HistoryStore::load_from(dir.path().join("h.json"), HistoryConfig::default()).unwrap();
        store.add(entry("a")).unwrap();
        store.clear().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_nonexistent() {
        let dir = TempDir::new().unwrap();
        let store =
            HistoryStore::load_from(dir.path().join("missing.json"), HistoryConfig::default())
                .unwrap();
        assert!(store.is_empty());
    }
}
