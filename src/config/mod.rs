/// TOML configuration with defaults and validation
pub mod conf;

pub use conf::{Config, ConsoleConfig, HealthConfig, StorageConfig};
