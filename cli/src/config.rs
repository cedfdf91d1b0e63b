// Configuration management for the BridgePortal CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/bridgeportal/config.json
// - Linux: ~/.config/bridgeportal/config.json
// - Windows: %APPDATA%\bridgeportal\config.json

use anyhow::{Context, Result};
use bridgeportal_core::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the sled store lives (defaults to the data directory)
    pub storage_path: Option<String>,

    /// Directory for daily-rolling log files; stderr only when unset
    pub log_dir: Option<String>,

    /// Draft, autosave and retry settings
    pub store: StoreConfig,
}

const KEYS: &[&str] = &[
    "storage_path",
    "log_dir",
    "draft_ttl_ms",
    "autosave_delay_ms",
    "max_retries",
    "retry_delays_ms",
    "draft_key_prefix",
    "retry_queue_key",
];

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("bridgeportal");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the data directory path (cross-platform)
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to determine data directory")?
            .join("bridgeportal");

        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        Ok(data_dir)
    }

    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from file, or create default if not exists
    pub fn load() -> Result<Self> {
        let config_file = Self::config_file()?;

        if config_file.exists() {
            let contents =
                std::fs::read_to_string(&config_file).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            config
                .store
                .validate()
                .with_context(|| format!("Invalid settings in {}", config_file.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_file = Self::config_file()?;
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_file, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Resolved sled store location
    pub fn storage_path(&self) -> Result<PathBuf> {
        match &self.storage_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(Self::data_dir()?.join("store")),
        }
    }

    /// Set a config value and persist it
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.apply(key, value)?;
        self.save()
    }

    /// Set a config value in memory, rejecting values that leave the store unusable
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.clone();
        match key {
            "storage_path" => updated.storage_path = non_empty(value),
            "log_dir" => updated.log_dir = non_empty(value),
            "draft_ttl_ms" => {
                updated.store.draft_ttl_ms = value.parse().context("Invalid number")?;
            }
            "autosave_delay_ms" => {
                updated.store.autosave_delay_ms = value.parse().context("Invalid number")?;
            }
            "max_retries" => {
                updated.store.retry.max_retries = value.parse().context("Invalid number")?;
            }
            "retry_delays_ms" => {
                updated.store.retry.delays_ms = value
                    .split(',')
                    .map(|part| part.trim().parse::<u64>())
                    .collect::<std::result::Result<_, _>>()
                    .context("Expected a comma-separated list of milliseconds")?;
            }
            "draft_key_prefix" => updated.store.draft_key_prefix = value.to_string(),
            "retry_queue_key" => updated.store.retry_queue_key = value.to_string(),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        updated.store.validate()?;
        *self = updated;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "storage_path" => self.storage_path.clone(),
            "log_dir" => self.log_dir.clone(),
            "draft_ttl_ms" => Some(self.store.draft_ttl_ms.to_string()),
            "autosave_delay_ms" => Some(self.store.autosave_delay_ms.to_string()),
            "max_retries" => Some(self.store.retry.max_retries.to_string()),
            "retry_delays_ms" => Some(
                self.store
                    .retry
                    .delays_ms
                    .iter()
                    .map(u64::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            "draft_key_prefix" => Some(self.store.draft_key_prefix.clone()),
            "retry_queue_key" => Some(self.store.retry_queue_key.clone()),
            _ => None,
        }
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        KEYS.iter()
            .map(|key| {
                let value = self.get(key).unwrap_or_else(|| "(auto)".to_string());
                (key.to_string(), value)
            })
            .collect()
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.storage_path.is_none());
        assert_eq!(config.store.draft_ttl_ms, 86_400_000);
        assert_eq!(config.get("retry_delays_ms").unwrap(), "1000,5000,15000");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config.store, deserialized.store);

        // Older files without a store section still load
        let legacy: Config = serde_json::from_str(r#"{"storage_path": "/tmp/x"}"#).unwrap();
        assert_eq!(legacy.store, StoreConfig::default());
    }

    #[test]
    fn test_apply_values() {
        let mut config = Config::default();
        config.apply("autosave_delay_ms", "750").unwrap();
        config.apply("retry_delays_ms", "500, 2000").unwrap();
        config.apply("storage_path", "/var/lib/bridgeportal").unwrap();

        assert_eq!(config.store.autosave_delay_ms, 750);
        assert_eq!(config.store.retry.delays_ms, vec![500, 2_000]);
        assert_eq!(config.get("storage_path").as_deref(), Some("/var/lib/bridgeportal"));

        config.apply("storage_path", "").unwrap();
        assert!(config.storage_path.is_none());
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.apply("max_retries", "many").is_err());
        assert!(config.apply("max_retries", "0").is_err());
        assert!(config.apply("retry_delays_ms", "").is_err());
        assert!(config.apply("listen_port", "80").is_err());
        // Failed updates leave the config untouched
        assert_eq!(config.store.retry.max_retries, 3);
        assert_eq!(config.list().len(), KEYS.len());
    }
}
