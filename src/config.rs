//! Configuration management for the relay daemon.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for storing data
    pub data_dir: PathBuf,

    /// Path to SQLite database
    pub db_path: PathBuf,

    /// Path to config directory
    pub config_dir: PathBuf,

    /// Host the HTTP server binds to
    pub host: String,

    /// HTTP port for the API and WebSocket server
    pub http_port: u16,

    /// Bound on any single store operation, in seconds
    pub store_timeout_secs: u64,

    /// Event bus channel capacity per subscriber
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| home.join(".local/share"))
            .join("sos-relay");
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| home.join(".config"))
            .join("sos-relay");

        Self {
            db_path: data_dir.join("alerts.db"),
            data_dir,
            config_dir,
            host: "127.0.0.1".to_string(),
            http_port: 5000,
            store_timeout_secs: 5,
            event_capacity: crate::events::DEFAULT_CAPACITY,
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Ensure all directories exist.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.config_dir)?;
        Ok(())
    }
}
