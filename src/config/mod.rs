//! Layered application configuration.
//!
//! Settings come from an optional YAML file overlaid with `PMW_`-prefixed
//! environment variables (`PMW_SNMP__HOST`, `PMW_STORAGE__PATH`, and so on).
//! Every field has a serde default so a bare host plus community is enough
//! to run.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::collectors::TrafficSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnmpConfig {
    pub host: String,
    #[serde(default = "default_snmp_port")]
    pub port: u16,
    pub community: String,
    #[serde(default = "default_snmp_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_snmp_retries")]
    pub retries: u32,
    #[serde(default = "default_max_repetitions")]
    pub max_repetitions: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_counter_ttl_secs")]
    pub counter_ttl_secs: u64,
    #[serde(default = "default_request_ttl_secs")]
    pub request_ttl_secs: u64,
    #[serde(default = "default_failed_request_ttl_secs")]
    pub failed_request_ttl_secs: u64,
    #[serde(default = "default_max_counters")]
    pub max_counters: usize,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            counter_ttl_secs: default_counter_ttl_secs(),
            request_ttl_secs: default_request_ttl_secs(),
            failed_request_ttl_secs: default_failed_request_ttl_secs(),
            max_counters: default_max_counters(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PmConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_request_retries")]
    pub request_retries: u32,
    #[serde(default)]
    pub port_filter: Option<String>,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

impl Default for PmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
            request_timeout_secs: default_request_timeout_secs(),
            request_retries: default_request_retries(),
            port_filter: None,
            cache_ttl_secs: default_cache_ttl_secs(),
            batch_delay_ms: default_batch_delay_ms(),
            cleanup: CleanupConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: String,
    #[serde(default = "default_storage_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            batch_size: default_storage_batch_size(),
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionConfig {
    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            startup_delay_secs: default_startup_delay_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub snmp: SnmpConfig,
    #[serde(default)]
    pub pm: PmConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
}

impl AppConfig {
    /// Loads configuration from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        } else {
            builder = builder.add_source(File::with_name("pm-watcher").required(false));
        }
        builder = builder.add_source(Environment::with_prefix("PMW").separator("__"));

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.snmp.host.trim().is_empty() {
            return Err(ConfigError::Invalid("snmp.host must not be empty".into()));
        }
        if self.snmp.community.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "snmp.community must not be empty".into(),
            ));
        }
        if self.pm.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "pm.batch_size must be at least 1".into(),
            ));
        }
        if self.pm.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "pm.interval_secs must be at least 1".into(),
            ));
        }
        if self.storage.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "storage.batch_size must be at least 1".into(),
            ));
        }
        if self.storage.flush_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "storage.flush_interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn traffic_settings(&self) -> TrafficSettings {
        TrafficSettings {
            batch_size: self.pm.batch_size,
            request_timeout: Duration::from_secs(self.pm.request_timeout_secs),
            request_retries: self.pm.request_retries,
            port_filter: self.pm.port_filter.clone(),
            cache_ttl: Duration::from_secs(self.pm.cache_ttl_secs),
            batch_delay: Duration::from_millis(self.pm.batch_delay_ms),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_snmp_port() -> u16 {
    161
}

fn default_snmp_timeout_secs() -> u64 {
    5
}

fn default_snmp_retries() -> u32 {
    3
}

fn default_max_repetitions() -> u32 {
    25
}

fn default_interval_secs() -> u64 {
    60
}

fn default_batch_size() -> usize {
    50
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_request_retries() -> u32 {
    3
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_batch_delay_ms() -> u64 {
    500
}

fn default_counter_ttl_secs() -> u64 {
    3600
}

fn default_request_ttl_secs() -> u64 {
    3600
}

fn default_failed_request_ttl_secs() -> u64 {
    1800
}

fn default_max_counters() -> usize {
    10_000
}

fn default_storage_path() -> String {
    "pm-watcher.db".to_string()
}

fn default_storage_batch_size() -> usize {
    100
}

fn default_flush_interval_secs() -> u64 {
    10
}

fn default_startup_delay_secs() -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_yaml(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn minimal_file_gets_defaults() {
        let file = write_yaml("snmp:\n  host: 10.0.0.1\n  community: public\n");
        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.snmp.port, 161);
        assert_eq!(config.pm.interval_secs, 60);
        assert_eq!(config.pm.batch_size, 50);
        assert_eq!(config.storage.flush_interval_secs, 10);
        assert!(config.pm.enabled);
    }

    #[test]
    fn rejects_blank_community() {
        let file = write_yaml("snmp:\n  host: 10.0.0.1\n  community: \"  \"\n");
        assert!(matches!(
            AppConfig::load(Some(file.path())),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_zero_batch_size() {
        let file = write_yaml(
            "snmp:\n  host: 10.0.0.1\n  community: public\npm:\n  batch_size: 0\n",
        );
        assert!(matches!(
            AppConfig::load(Some(file.path())),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn overrides_survive_nesting() {
        let file = write_yaml(
            "snmp:\n  host: 10.0.0.1\n  community: public\npm:\n  port_filter: \"^eth\"\n  cleanup:\n    max_counters: 500\n",
        );
        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.pm.port_filter.as_deref(), Some("^eth"));
        assert_eq!(config.pm.cleanup.max_counters, 500);
    }
}
