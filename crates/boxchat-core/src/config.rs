//! Client configuration
//!
//! Read from `<data_dir>/config.json` when present. Missing fields fall back
//! to their defaults, so a file containing only `{"relay_url": "..."}` is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ChatResult;

/// File name of the configuration inside the data directory
pub const CONFIG_FILE: &str = "config.json";

/// Relay used when nothing else is configured
pub const DEFAULT_RELAY_URL: &str = "http://localhost:3000";

/// Tunables for the relay client, sync loop and read tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the relay
    pub relay_url: String,
    /// Delay between the end of one poll cycle and the start of the next
    pub poll_interval_ms: u64,
    /// How long a message must stay visible and focused before it counts as read
    pub read_dwell_ms: u64,
    /// Messages loaded when a conversation is opened
    pub message_page_limit: usize,
    /// Explicit contacts listed in the directory
    pub contact_list_limit: usize,
    /// Per-request HTTP timeout
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            poll_interval_ms: 1000,
            read_dwell_ms: 1500,
            message_page_limit: 1000,
            contact_list_limit: 1000,
            request_timeout_ms: 15_000,
        }
    }
}

impl ClientConfig {
    /// Load `<data_dir>/config.json`, or defaults if the file does not exist.
    pub fn load(data_dir: impl AsRef<Path>) -> ChatResult<Self> {
        let path = data_dir.as_ref().join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read(&path)?;
        let config = serde_json::from_slice(&data)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Write this configuration to `<data_dir>/config.json`.
    pub fn save(&self, data_dir: impl AsRef<Path>) -> ChatResult<()> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(data_dir.join(CONFIG_FILE), data)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_dwell(&self) -> Duration {
        Duration::from_millis(self.read_dwell_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ClientConfig::load(dir.path()).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"relay_url": "https://relay.example", "poll_interval_ms": 5000}"#,
        )
        .unwrap();

        let config = ClientConfig::load(dir.path()).unwrap();
        assert_eq!(config.relay_url, "https://relay.example");
        assert_eq!(config.poll_interval_ms, 5000);
        assert_eq!(config.read_dwell_ms, 1500);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let config = ClientConfig {
            read_dwell_ms: 250,
            ..ClientConfig::default()
        };
        config.save(dir.path()).unwrap();
        assert_eq!(ClientConfig::load(dir.path()).unwrap(), config);
    }

    #[test]
    fn test_malformed_file_is_serialization_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "not json").unwrap();
        assert!(matches!(
            ClientConfig::load(dir.path()),
            Err(crate::error::ChatError::Serialization(_))
        ));
    }
}
