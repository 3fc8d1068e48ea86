/// Bounded error report store and severity classification
pub mod classify;
pub mod error_registry;

pub use classify::classify_severity;
pub use error_registry::{
    ErrorContext, ErrorDetails, ErrorFilter, ErrorQueryResult, ErrorRegistry, ErrorReport,
    ErrorStats,
};
