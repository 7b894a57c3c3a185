//! Configuration management for Fling.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/fling/config.toml` |
//! | macOS | `~/Library/Application Support/Fling/config.toml` |
//! | Windows | `%APPDATA%\Fling\config.toml` |

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration struct for Fling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Network settings
    pub network: NetworkConfig,
    /// Discovery settings
    pub discovery: DiscoveryTuning,
    /// Transfer settings
    pub transfer: TransferTuning,
    /// History settings
    pub history: HistoryConfig,
}

/// General configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Display name on the network
    pub device_name: String,
    /// Default directory for received files
    pub default_output: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            device_name: hostname::get().map_or_else(
                |_| "Fling Device".to_string(),
                |h| h.to_string_lossy().to_string(),
            ),
            default_output: None,
        }
    }
}

/// Network configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Transfer port (TCP)
    pub transfer_port: u16,
    /// Enable mDNS advertisement and lookup
    pub mdns: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            transfer_port: crate::DEFAULT_TRANSFER_PORT,
            mdns: true,
        }
    }
}

/// Subnet scan tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryTuning {
    /// Per-probe timeout in milliseconds
    pub probe_timeout_ms: u64,
    /// Candidates probed concurrently
    pub batch_size: usize,
    /// Maximum passes over the candidate list
    pub max_attempts: u32,
    /// Pause between passes in milliseconds
    pub retry_delay_ms: u64,
    /// mDNS resolution timeout in milliseconds
    pub mdns_timeout_ms: u64,
}

impl Default for DiscoveryTuning {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 1500,
            batch_size: crate::SCAN_BATCH_SIZE,
            max_attempts: crate::MAX_SCAN_ATTEMPTS,
            retry_delay_ms: 1000,
            mdns_timeout_ms: 5000,
        }
    }
}

impl DiscoveryTuning {
    /// Convert to the discovery layer's config type.
    #[must_use]
    pub fn to_discovery_config(&self) -> crate::discovery::DiscoveryConfig {
        crate::discovery::DiscoveryConfig {
            mdns_timeout: std::time::Duration::from_millis(self.mdns_timeout_ms),
            probe_timeout: std::time::Duration::from_millis(self.probe_timeout_ms),
            batch_size: self.batch_size,
            max_attempts: self.max_attempts,
            retry_delay: std::time::Duration::from_millis(self.retry_delay_ms),
            rebuild_every: 5,
        }
    }
}

/// Transfer tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferTuning {
    /// Metadata poll interval in milliseconds (receiver)
    pub poll_interval_ms: u64,
    /// Metadata fetch timeout in milliseconds
    pub metadata_timeout_ms: u64,
    /// Progress report step for device transfers, in percent
    pub progress_step: u8,
    /// Progress report step for browser downloads, in percent
    pub http_progress_step: u8,
}

impl Default for TransferTuning {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3000,
            metadata_timeout_ms: 5000,
            progress_step: 5,
            http_progress_step: 2,
        }
    }
}

/// History configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Whether history recording is enabled
    pub enabled: bool,
    /// Maximum number of entries kept
    pub max_entries: usize,
    /// Remove entries older than this many days (None keeps everything)
    pub auto_clear_days: Option<u32>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 500,
            auto_clear_days: None,
        }
    }
}

impl Config {
    /// Load the configuration from the default location, falling back to
    /// defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&text)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Save to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()
            .ok_or_else(|| Error::Config("no config directory on this platform".to_string()))?;
        self.save_to(&path)
    }

    /// Save to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("failed to create {}: {e}", parent.display())))?;
        }
        let text = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, text)
            .map_err(|e| Error::Config(format!("failed to write {}: {e}", path.display())))?;
        Ok(())
    }

    /// The default config file path for this platform.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("sh", "fling", "Fling")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.network.transfer_port, crate::DEFAULT_TRANSFER_PORT);
        assert!(config.network.mdns);
        assert_eq!(config.discovery.batch_size, 5);
        assert_eq!(config.transfer.progress_step, 5);
        assert_eq!(config.transfer.http_progress_step, 2);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.network.transfer_port = 4000;
        config.general.device_name = "Pixel".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.network.transfer_port, 4000);
        assert_eq!(loaded.general.device_name, "Pixel");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[network]\ntransfer_port = 9999\n").unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.network.transfer_port, 9999);
        assert_eq!(loaded.discovery.max_attempts, crate::MAX_SCAN_ATTEMPTS);
    }

    #[test]
    fn test_malformed_file_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not toml {{{{").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
