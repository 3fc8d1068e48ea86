/// Error types for probes, export and configuration
pub mod error;

/// Shared event, severity and health types
pub mod events;

/// Structured log store with filtering, metrics and export
pub mod aggregator;

/// Classified error reports
pub mod registry;

/// Request latency windows and percentiles
pub mod performance;

/// Concurrent dependency health probes
pub mod health;

/// Threshold rules, cooldowns and alert history
pub mod alerts;

/// Component wiring and request ingestion
pub mod monitor;

/// Configuration management
pub mod config;

// Re-export commonly used types
pub use error::{ConfigError, ExportError, ProbeError};
pub use monitor::{Monitor, PurgeSummary, RequestRecord};
