/// Request latency tracking, percentiles and resource sampling
pub mod resources;
pub mod tracker;

pub use resources::ResourceUsage;
pub use tracker::{
    percentile, MetricSample, PerformanceHealth, PerformanceReport, PerformanceSettings,
    PerformanceSummary, PerformanceTracker,
};
