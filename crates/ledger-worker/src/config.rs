//! Worker configuration loaded from environment variables.

use anyhow::{Context, Result};
use credit_ledger::LedgerConfig;
use serde::Deserialize;
use std::path::PathBuf;

/// Worker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Ledger configuration
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Credit store configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Team/user directory configuration
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Worker configuration
    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding balances and expense logs. In-memory when unset.
    #[serde(default = "default_storage_path")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryConfig {
    /// JSON document with teams, users and memberships.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_storage_path() -> Option<PathBuf> {
    Some(PathBuf::from("/data/credits.json"))
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();

        assert_eq!(config.worker.log_level, "info");
        assert_eq!(
            config.storage.path,
            Some(PathBuf::from("/data/credits.json"))
        );
        assert!(config.directory.path.is_none());
        assert_eq!(config.ledger.price_per_seat, 15);
    }

    #[test]
    fn test_nested_sections() {
        let json = r#"{
            "ledger": {"price_per_seat": 20, "sms_credits_enabled": false},
            "storage": {"path": "/tmp/credits.json"},
            "directory": {"path": "/etc/ledger/directory.json"},
            "worker": {"log_level": "debug"}
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.ledger.price_per_seat, 20);
        assert!(!config.ledger.sms_credits_enabled);
        assert_eq!(config.storage.path, Some(PathBuf::from("/tmp/credits.json")));
        assert_eq!(
            config.directory.path,
            Some(PathBuf::from("/etc/ledger/directory.json"))
        );
        assert_eq!(config.worker.log_level, "debug");
    }
}
