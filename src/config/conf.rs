use crate::error::ConfigError;
use crate::health::SQL_URL_SCHEMES;
use crate::performance::PerformanceSettings;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAX_PROBE_TIMEOUT_MS: u64 = 30_000;
const SIGNING_SECRET_ENV: &str = "LABWATCH_SIGNING_SECRET";
const DATA_STORE_ADDR_ENV: &str = "LABWATCH_DATA_STORE_ADDR";
const DATABASE_URL_ENV: &str = "LABWATCH_DATABASE_URL";

/// Top-level configuration
///
/// Every section and field has a default, so an empty file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub performance: PerformanceSettings,
    pub health: HealthConfig,
    pub console: ConsoleConfig,
}

/// Capacities of the bounded stores
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub max_logs: usize,
    pub max_errors: usize,
    pub max_alerts: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_logs: 10_000,
            max_errors: 1000,
            max_alerts: 1000,
        }
    }
}

/// Health probe bindings and reported identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    pub probe_timeout_ms: u64,
    pub version: String,
    pub environment: String,
    pub signing_secret: String,
    /// Database probed with `SELECT 1`; takes precedence over `data_store_addr`
    pub database_url: Option<String>,
    /// `host:port` checked for TCP reachability only
    ///
    /// With neither this nor `database_url` set the data-store probe runs in
    /// mock mode.
    pub data_store_addr: Option<String>,
    /// Directory used as the object store; no object store when unset
    pub object_store_dir: Option<PathBuf>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 2000,
            version: "1.0.0".to_string(),
            environment: "development".to_string(),
            signing_secret: "labwatch-development-secret".to_string(),
            database_url: None,
            data_store_addr: None,
            object_store_dir: None,
        }
    }
}

impl HealthConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Rendering of recorded entries on the diagnostic log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub color: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            color: true,
        }
    }
}

impl Config {
    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Load configuration for the binary
    ///
    /// A missing file falls back to defaults with a warning. A file that
    /// exists but fails to parse or validate is an error. Environment
    /// overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                info!("Loading configuration from: {}", path.display());
                Self::from_file(path)?
            }
            Some(path) => {
                warn!(
                    "Configuration file '{}' not found, using defaults",
                    path.display()
                );
                Self::default()
            }
            None => {
                info!("Using default configuration");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var(SIGNING_SECRET_ENV) {
            self.health.signing_secret = secret;
        }
        if let Ok(addr) = std::env::var(DATA_STORE_ADDR_ENV) {
            self.health.data_store_addr = Some(addr);
        }
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            self.health.database_url = Some(url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacities = [
            ("storage.max_logs", self.storage.max_logs),
            ("storage.max_errors", self.storage.max_errors),
            ("storage.max_alerts", self.storage.max_alerts),
            ("performance.latency_window", self.performance.latency_window),
            ("performance.metric_log_size", self.performance.metric_log_size),
            ("performance.throughput_window", self.performance.throughput_window),
        ];
        for (field, value) in capacities {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be greater than 0",
                    field
                )));
            }
        }

        if self.performance.slow_request_ms <= 0.0 || self.performance.very_slow_request_ms <= 0.0
        {
            return Err(ConfigError::ValidationError(
                "performance slow request thresholds must be positive".to_string(),
            ));
        }

        if self.health.probe_timeout_ms == 0 || self.health.probe_timeout_ms > MAX_PROBE_TIMEOUT_MS
        {
            return Err(ConfigError::ValidationError(format!(
                "health.probe_timeout_ms must be between 1 and {}",
                MAX_PROBE_TIMEOUT_MS
            )));
        }

        if self.health.signing_secret.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "health.signing_secret must not be empty".to_string(),
            ));
        }

        if let Some(url) = &self.health.database_url {
            if !SQL_URL_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
                return Err(ConfigError::ValidationError(format!(
                    "health.database_url must start with one of {}",
                    SQL_URL_SCHEMES.join(", ")
                )));
            }
        }

        Ok(())
    }
}
