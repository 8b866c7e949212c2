//! Coordinator configuration, loadable from TOML.
//!
//! Defaults match the editor behavior: title edits settle after ~1s, full
//! content snapshots after ~2s, and a failed save gets one immediate retry
//! when the error is transient.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::debounce::ChangeClass;

/// Error loading or parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Tunables for the auto-save coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    /// Quiet period before a metadata (title) change persists.
    pub metadata_delay_ms: u64,
    /// Quiet period before a content change persists.
    pub content_delay_ms: u64,
    /// Immediate retries after a transient save failure.
    pub retry_limit: u32,
    /// Broadcast capacity of the save event bus.
    pub event_capacity: usize,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            metadata_delay_ms: 1_000,
            content_delay_ms: 2_000,
            retry_limit: 1,
            event_capacity: 1_024,
        }
    }
}

impl AutoSaveConfig {
    pub fn metadata_delay(&self) -> Duration {
        Duration::from_millis(self.metadata_delay_ms)
    }

    pub fn content_delay(&self) -> Duration {
        Duration::from_millis(self.content_delay_ms)
    }

    /// The debounce delay for a given change class.
    pub fn delay_for(&self, class: ChangeClass) -> Duration {
        match class {
            ChangeClass::Metadata => self.metadata_delay(),
            ChangeClass::Content => self.content_delay(),
        }
    }

    /// Parse from a TOML string. Unspecified fields keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AutoSaveConfig::default();
        assert_eq!(config.metadata_delay(), Duration::from_secs(1));
        assert_eq!(config.content_delay(), Duration::from_secs(2));
        assert_eq!(config.retry_limit, 1);
    }

    #[test]
    fn test_delay_for_class() {
        let config = AutoSaveConfig::default();
        assert_eq!(config.delay_for(ChangeClass::Metadata), config.metadata_delay());
        assert_eq!(config.delay_for(ChangeClass::Content), config.content_delay());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AutoSaveConfig::from_toml_str("content_delay_ms = 500").unwrap();
        assert_eq!(config.content_delay_ms, 500);
        assert_eq!(config.metadata_delay_ms, 1_000);
        assert_eq!(config.retry_limit, 1);
    }

    #[test]
    fn test_full_toml() {
        let config = AutoSaveConfig::from_toml_str(
            r#"
            metadata_delay_ms = 250
            content_delay_ms = 750
            retry_limit = 2
            event_capacity = 64
            "#,
        )
        .unwrap();
        assert_eq!(config.metadata_delay_ms, 250);
        assert_eq!(config.content_delay_ms, 750);
        assert_eq!(config.retry_limit, 2);
        assert_eq!(config.event_capacity, 64);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(AutoSaveConfig::from_toml_str("content_delay_ms = \"fast\"").is_err());
    }
}
