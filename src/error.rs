use thiserror::Error;

/// Errors raised by health probe bindings
///
/// These never escape the health aggregator: every probe converts them into
/// a critical `HealthCheckResult`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Probe timed out after {0}ms")]
    Timeout(u64),

    #[error("Storage operation failed: {0}")]
    Storage(String),

    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error("Probe task aborted: {0}")]
    Aborted(String),
}

impl From<std::io::Error> for ProbeError {
    fn from(err: std::io::Error) -> Self {
        ProbeError::Storage(err.to_string())
    }
}

impl From<sqlx::Error> for ProbeError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(e) => ProbeError::Connection(e.to_string()),
            sqlx::Error::PoolTimedOut => ProbeError::Connection("pool timed out".to_string()),
            other => ProbeError::Query(other.to_string()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for ProbeError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        ProbeError::Signing(err.to_string())
    }
}

/// Errors that can occur when exporting the log set
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
