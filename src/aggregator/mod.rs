/// Structured log ring buffer with filtering and derived metrics
pub mod console;
pub mod event_store;
pub mod log_metrics;

pub use console::ConsoleOutput;
pub use event_store::{EventStore, ExportFormat, LogFilter, LogQueryResult};
pub use log_metrics::{ErrorFrequency, LogMetrics};
