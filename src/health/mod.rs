pub mod aggregator;
pub mod probes;
pub mod signing;

pub use aggregator::{
    overall_status, HealthAggregator, HealthCheckResult, HealthMetrics, HealthSettings,
    SystemHealth,
};
pub use probes::{
    DataStore, DirObjectStore, MemoryObjectStore, ObjectStore, SqlDataStore, TcpDataStore,
    SQL_URL_SCHEMES,
};
pub use signing::TokenSigner;
