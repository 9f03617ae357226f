//! Configuration for trail-sync

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SyncError;
use crate::identity::UserId;

/// Placeholder replaced by the user id in `document_path_template`
pub const UID_PLACEHOLDER: &str = "{uid}";

/// Default data directory for file-backed stores
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("moneva-trail")
}

/// Synchronizer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Delay between the first dirty signal and the write (milliseconds)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Expedited delay used after a reset (milliseconds)
    #[serde(default = "default_reset_debounce_ms")]
    pub reset_debounce_ms: u64,

    /// Logical path of the per-user progress document
    #[serde(default = "default_document_path_template")]
    pub document_path_template: String,

    /// Root directory for the file-backed store
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Event bus capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_debounce_ms() -> u64 {
    3000
}

fn default_reset_debounce_ms() -> u64 {
    500
}

fn default_document_path_template() -> String {
    "users/{uid}/trilha/status".to_string()
}

fn default_event_capacity() -> usize {
    256
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            reset_debounce_ms: default_reset_debounce_ms(),
            document_path_template: default_document_path_template(),
            data_dir: default_data_dir(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl SyncConfig {
    /// Load config from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SyncError> {
        let content = std::fs::read_to_string(path)?;
        let config: SyncConfig =
            toml::from_str(&content).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SyncError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| SyncError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if !self.document_path_template.contains(UID_PLACEHOLDER) {
            return Err(SyncError::Config(format!(
                "document_path_template must contain {}",
                UID_PLACEHOLDER
            )));
        }
        if self.event_capacity == 0 {
            return Err(SyncError::Config("event_capacity must be positive".to_string()));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn reset_debounce(&self) -> Duration {
        Duration::from_millis(self.reset_debounce_ms)
    }

    /// Document path for one user
    pub fn document_path(&self, user: &UserId) -> String {
        self.document_path_template
            .replace(UID_PLACEHOLDER, user.as_str())
    }

    /// Default location of the config file inside the data directory
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.debounce(), Duration::from_millis(3000));
        assert_eq!(config.reset_debounce(), Duration::from_millis(500));
        assert_eq!(
            config.document_path(&UserId::new("abc")),
            "users/abc/trilha/status"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SyncConfig = toml::from_str("debounce_ms = 1000").unwrap();
        assert_eq!(config.debounce_ms, 1000);
        assert_eq!(config.reset_debounce_ms, 500);
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = SyncConfig::default();
        config.debounce_ms = 1234;
        config.data_dir = dir.path().to_path_buf();
        config.save(&path).unwrap();

        let loaded = SyncConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_rejects_template_without_uid() {
        let config = SyncConfig {
            document_path_template: "progress/shared".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }
}
