//! Rolling-window request performance tracking
//!
//! The tracker keeps three bounded collections: the most recent raw
//! latencies (for percentile math), the request timestamps of the last hour
//! (for throughput math, capped at `throughput_window` entries), and a
//! general metric log shared by every metric kind. All three are updated
//! under one lock per call.

use crate::aggregator::EventStore;
use crate::events::{hours_before, HealthStatus, LogLevel, RequestContext, Timestamp};
use crate::performance::resources::ResourceUsage;
use chrono::{Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Metric name used for request latency samples
pub const RESPONSE_TIME_METRIC: &str = "response_time";
/// Maximum samples returned by `slow_requests`
pub const SLOW_REQUESTS_LIMIT: usize = 50;

const COMPONENT: &str = "Performance";
const THROUGHPUT_HORIZON_MINUTES: i64 = 60;
const P95_CRITICAL_MS: f64 = 5000.0;
const P95_WARNING_MS: f64 = 2000.0;
const ERROR_RATE_CRITICAL: f64 = 10.0;
const ERROR_RATE_WARNING: f64 = 5.0;
const MEMORY_WARNING_MB: f64 = 512.0;
const THROUGHPUT_WARNING_RPS: f64 = 100.0;
const NOMINAL_ISSUE: &str = "All performance metrics within normal ranges";

/// Window sizes and thresholds for the tracker
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSettings {
    /// Number of raw latencies kept for percentile math
    pub latency_window: usize,
    /// Capacity of the metric log shared by every metric kind
    pub metric_log_size: usize,
    /// Maximum request timestamps kept for throughput math
    ///
    /// Throughput above `throughput_window / 60` requests per second is
    /// undercounted once the cap is reached.
    pub throughput_window: usize,
    /// Default threshold for `slow_requests` and `summary`
    pub slow_request_ms: f64,
    /// Latencies above this also emit a WARN log entry
    pub very_slow_request_ms: f64,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            latency_window: 1000,
            metric_log_size: 1000,
            throughput_window: 36_000,
            slow_request_ms: 2000.0,
            very_slow_request_ms: 5000.0,
        }
    }
}

/// One entry of the general metric log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub timestamp: Timestamp,
    pub tags: BTreeMap<String, String>,
}

impl MetricSample {
    fn is_error(&self) -> bool {
        self.tags.get("status").is_some_and(|status| status == "error")
    }
}

#[derive(Debug, Clone, Copy)]
struct LatencySample {
    timestamp: Timestamp,
    latency_ms: f64,
}

#[derive(Debug, Default)]
struct TrackerState {
    latencies: VecDeque<LatencySample>,
    throughput: VecDeque<Timestamp>,
    metrics: VecDeque<MetricSample>,
    total_requests: u64,
    error_count: u64,
}

/// Point-in-time performance report
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub timestamp: Timestamp,
    pub total_requests: u64,
    pub error_count: u64,
    /// Percentage of requests that failed, 0 before any request
    pub error_rate: f64,
    pub avg_response_time: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub requests_per_second: f64,
    pub requests_per_minute: f64,
    /// Number of latencies currently in the window
    pub sample_count: usize,
    pub resources: Option<ResourceUsage>,
}

/// Health verdict derived from a performance report
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PerformanceHealth {
    pub status: HealthStatus,
    pub issues: Vec<String>,
}

/// Aggregate over the metric log within a look-back horizon
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub hours: i64,
    pub total_requests: usize,
    pub avg_response_time: f64,
    pub error_rate: f64,
    pub slow_requests: usize,
}

type ResourceSampler = Arc<dyn Fn() -> Option<ResourceUsage> + Send + Sync>;

/// Value at percentile `p` of an ascending-sorted slice
///
/// Uses index `ceil(p / 100 * n) - 1`, clamped to the slice. An empty slice
/// yields 0.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p / 100.0 * sorted.len() as f64).ceil() as i64 - 1;
    let index = rank.clamp(0, sorted.len() as i64 - 1) as usize;
    sorted[index]
}

/// Tracks request latencies, outcomes and throughput
pub struct PerformanceTracker {
    state: Mutex<TrackerState>,
    settings: PerformanceSettings,
    events: Arc<EventStore>,
    resource_sampler: ResourceSampler,
}

impl std::fmt::Debug for PerformanceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceTracker")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl PerformanceTracker {
    /// Create a tracker
    ///
    /// # Arguments
    ///
    /// * `settings` - Window capacities and slow-request thresholds
    /// * `events` - Receives a WARN entry for every very slow request
    pub fn new(settings: PerformanceSettings, events: Arc<EventStore>) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            settings,
            events,
            resource_sampler: Arc::new(ResourceUsage::sample),
        }
    }

    /// Replace host introspection, e.g. to pin memory figures in tests
    pub fn with_resource_sampler<F>(mut self, sampler: F) -> Self
    where
        F: Fn() -> Option<ResourceUsage> + Send + Sync + 'static,
    {
        self.resource_sampler = Arc::new(sampler);
        self
    }

    pub fn settings(&self) -> &PerformanceSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one completed request
    pub fn record_request(&self, latency_ms: f64, is_error: bool) {
        self.record_request_at(latency_ms, is_error, Utc::now());
    }

    /// Record one completed request observed at `at`
    ///
    /// # Arguments
    ///
    /// * `latency_ms` - Wall-clock duration of the request
    /// * `is_error` - Whether the request counts toward the error rate
    /// * `at` - When the request completed; throughput expiry is relative to it
    ///
    /// Requests slower than `very_slow_request_ms` also emit a WARN log entry.
    pub fn record_request_at(&self, latency_ms: f64, is_error: bool, at: Timestamp) {
        {
            let mut state = self.lock();

            state.latencies.push_back(LatencySample {
                timestamp: at,
                latency_ms,
            });
            while state.latencies.len() > self.settings.latency_window {
                state.latencies.pop_front();
            }

            state.throughput.push_back(at);
            let horizon = at - Duration::minutes(THROUGHPUT_HORIZON_MINUTES);
            while state.throughput.front().is_some_and(|&time| time < horizon) {
                state.throughput.pop_front();
            }
            while state.throughput.len() > self.settings.throughput_window {
                state.throughput.pop_front();
            }

            state.total_requests += 1;
            if is_error {
                state.error_count += 1;
            }

            let status = if is_error { "error" } else { "success" };
            let sample = MetricSample {
                name: RESPONSE_TIME_METRIC.to_string(),
                value: latency_ms,
                timestamp: at,
                tags: BTreeMap::from([("status".to_string(), status.to_string())]),
            };
            self.push_metric(&mut state, sample);
        }

        if latency_ms > self.settings.very_slow_request_ms {
            self.events.record(
                LogLevel::Warn,
                format!("Very slow request: {:.0}ms", latency_ms),
                COMPONENT,
                RequestContext::default()
                    .with_duration(latency_ms)
                    .with_tag("slow_request"),
            );
        }
    }

    /// Record an arbitrary metric into the shared metric log
    pub fn record_metric(&self, name: &str, value: f64, tags: BTreeMap<String, String>) {
        let sample = MetricSample {
            name: name.to_string(),
            value,
            timestamp: Utc::now(),
            tags,
        };
        let mut state = self.lock();
        self.push_metric(&mut state, sample);
    }

    fn push_metric(&self, state: &mut TrackerState, sample: MetricSample) {
        state.metrics.push_back(sample);
        while state.metrics.len() > self.settings.metric_log_size {
            state.metrics.pop_front();
        }
    }

    pub fn report(&self) -> PerformanceReport {
        self.report_at(Utc::now())
    }

    /// Build a report, measuring throughput relative to `now`
    pub fn report_at(&self, now: Timestamp) -> PerformanceReport {
        let (mut latencies, recent, total_requests, error_count) = {
            let state = self.lock();
            let minute_ago = now - Duration::seconds(60);
            let recent = state
                .throughput
                .iter()
                .filter(|&&time| time >= minute_ago && time <= now)
                .count();
            let latencies: Vec<f64> = state.latencies.iter().map(|s| s.latency_ms).collect();
            (latencies, recent, state.total_requests, state.error_count)
        };

        latencies.sort_by(f64::total_cmp);
        let avg_response_time = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<f64>() / latencies.len() as f64
        };
        let error_rate = if total_requests == 0 {
            0.0
        } else {
            error_count as f64 / total_requests as f64 * 100.0
        };

        PerformanceReport {
            timestamp: now,
            total_requests,
            error_count,
            error_rate,
            avg_response_time,
            p50: percentile(&latencies, 50.0),
            p90: percentile(&latencies, 90.0),
            p95: percentile(&latencies, 95.0),
            p99: percentile(&latencies, 99.0),
            requests_per_second: recent as f64 / 60.0,
            requests_per_minute: recent as f64,
            sample_count: latencies.len(),
            resources: (self.resource_sampler)(),
        }
    }

    pub fn health(&self) -> PerformanceHealth {
        Self::assess(&self.report())
    }

    /// Derive a health verdict from a report
    ///
    /// Thresholds only ever raise the status; a warning never replaces an
    /// earlier critical.
    pub fn assess(report: &PerformanceReport) -> PerformanceHealth {
        let mut status = HealthStatus::Healthy;
        let mut issues = Vec::new();

        if report.p95 > P95_CRITICAL_MS {
            status.escalate(HealthStatus::Critical);
            issues.push(format!("Critical response time: P95 is {:.0}ms", report.p95));
        } else if report.p95 > P95_WARNING_MS {
            status.escalate(HealthStatus::Warning);
            issues.push(format!("High response time: P95 is {:.0}ms", report.p95));
        }

        if report.error_rate > ERROR_RATE_CRITICAL {
            status.escalate(HealthStatus::Critical);
            issues.push(format!("Critical error rate: {:.1}%", report.error_rate));
        } else if report.error_rate > ERROR_RATE_WARNING {
            status.escalate(HealthStatus::Warning);
            issues.push(format!("Elevated error rate: {:.1}%", report.error_rate));
        }

        if let Some(resources) = &report.resources {
            if resources.memory_mb > MEMORY_WARNING_MB {
                status.escalate(HealthStatus::Warning);
                issues.push(format!("High memory usage: {:.0}MB", resources.memory_mb));
            }
        }

        if report.requests_per_second > THROUGHPUT_WARNING_RPS {
            status.escalate(HealthStatus::Warning);
            issues.push(format!(
                "High throughput: {:.1} req/s",
                report.requests_per_second
            ));
        }

        if issues.is_empty() {
            issues.push(NOMINAL_ISSUE.to_string());
        }

        PerformanceHealth { status, issues }
    }

    /// Most recent response-time samples above `threshold_ms`, newest first
    pub fn slow_requests(&self, threshold_ms: f64) -> Vec<MetricSample> {
        self.lock()
            .metrics
            .iter()
            .rev()
            .filter(|sample| sample.name == RESPONSE_TIME_METRIC && sample.value > threshold_ms)
            .take(SLOW_REQUESTS_LIMIT)
            .cloned()
            .collect()
    }

    /// Summary of response-time samples recorded within the last `hours`
    pub fn summary(&self, hours: i64) -> PerformanceSummary {
        let cutoff = hours_before(Utc::now(), hours);
        let state = self.lock();
        let samples: Vec<&MetricSample> = state
            .metrics
            .iter()
            .filter(|sample| {
                sample.name == RESPONSE_TIME_METRIC
                    && cutoff.map_or(true, |cutoff| sample.timestamp >= cutoff)
            })
            .collect();

        let total_requests = samples.len();
        let (avg_response_time, error_rate) = if total_requests == 0 {
            (0.0, 0.0)
        } else {
            let sum: f64 = samples.iter().map(|sample| sample.value).sum();
            let errors = samples.iter().filter(|sample| sample.is_error()).count();
            (
                sum / total_requests as f64,
                errors as f64 / total_requests as f64 * 100.0,
            )
        };
        let slow_requests = samples
            .iter()
            .filter(|sample| sample.value > self.settings.slow_request_ms)
            .count();

        PerformanceSummary {
            hours,
            total_requests,
            avg_response_time,
            error_rate,
            slow_requests,
        }
    }

    /// Drop samples older than `hours` from every window, returning the count removed
    ///
    /// An age too large to represent as a timestamp removes nothing.
    pub fn purge_older_than(&self, hours: i64) -> usize {
        let Some(cutoff) = hours_before(Utc::now(), hours) else {
            return 0;
        };
        let mut state = self.lock();
        let before = state.metrics.len() + state.latencies.len() + state.throughput.len();
        state.metrics.retain(|sample| sample.timestamp >= cutoff);
        state.latencies.retain(|sample| sample.timestamp >= cutoff);
        state.throughput.retain(|&time| time >= cutoff);
        let removed =
            before - (state.metrics.len() + state.latencies.len() + state.throughput.len());
        debug!("Purged {} performance samples older than {}h", removed, hours);
        removed
    }
}


// Property-based tests
#[cfg(test)]
mod property_tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn prop_percentiles_are_monotonic(latencies: Vec<u32>) -> bool {
        let mut sorted: Vec<f64> = latencies.iter().map(|&v| v as f64).collect();
        sorted.sort_by(f64::total_cmp);

        let p50 = percentile(&sorted, 50.0);
        let p90 = percentile(&sorted, 90.0);
        let p95 = percentile(&sorted, 95.0);
        let p99 = percentile(&sorted, 99.0);
        p50 <= p90 && p90 <= p95 && p95 <= p99
    }

    #[quickcheck]
    fn prop_percentile_is_a_member(latencies: Vec<u16>, p: u8) -> bool {
        if latencies.is_empty() {
            return true;
        }
        let mut sorted: Vec<f64> = latencies.iter().map(|&v| v as f64).collect();
        sorted.sort_by(f64::total_cmp);
        let value = percentile(&sorted, (p % 101) as f64);
        sorted.contains(&value)
    }
}
