//! Alert rule definitions, metric names and the default rule table

use crate::events::{HealthStatus, Severity};
use crate::performance::PerformanceReport;
use crate::registry::ErrorStats;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Broad category of an alert rule
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Performance,
    Error,
    Health,
    Resource,
}

impl AlertType {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::Performance => "performance",
            AlertType::Error => "error",
            AlertType::Health => "health",
            AlertType::Resource => "resource",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison applied between a live metric value and a rule threshold
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

impl Operator {
    pub fn compare(self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Gt => value > threshold,
            Operator::Gte => value >= threshold,
            Operator::Lt => value < threshold,
            Operator::Lte => value <= threshold,
            Operator::Eq => (value - threshold).abs() < f64::EPSILON,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Eq => "==",
        }
    }
}

/// A metric a rule can reference
///
/// Names outside the built-in set are kept as `Custom` and resolved through
/// the snapshot's lookup table at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Metric {
    ErrorRate,
    AvgResponseTime,
    P50ResponseTime,
    P90ResponseTime,
    P95ResponseTime,
    P99ResponseTime,
    RequestsPerSecond,
    RequestsPerMinute,
    TotalRequests,
    TotalErrors,
    CriticalErrors,
    ErrorsLast24h,
    UnresolvedErrors,
    HealthStatus,
    MemoryUsageMb,
    CpuTimeMs,
    Custom(String),
}

impl Metric {
    pub fn parse(name: &str) -> Self {
        match name {
            "error_rate" => Metric::ErrorRate,
            "avg_response_time" => Metric::AvgResponseTime,
            "p50_response_time" => Metric::P50ResponseTime,
            "p90_response_time" => Metric::P90ResponseTime,
            "p95_response_time" => Metric::P95ResponseTime,
            "p99_response_time" => Metric::P99ResponseTime,
            "requests_per_second" => Metric::RequestsPerSecond,
            "requests_per_minute" => Metric::RequestsPerMinute,
            "total_requests" => Metric::TotalRequests,
            "total_errors" => Metric::TotalErrors,
            "critical_errors" => Metric::CriticalErrors,
            "errors_last_24h" => Metric::ErrorsLast24h,
            "unresolved_errors" => Metric::UnresolvedErrors,
            "health_status" => Metric::HealthStatus,
            "memory_usage_mb" => Metric::MemoryUsageMb,
            "cpu_time_ms" => Metric::CpuTimeMs,
            other => Metric::Custom(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Metric::ErrorRate => "error_rate",
            Metric::AvgResponseTime => "avg_response_time",
            Metric::P50ResponseTime => "p50_response_time",
            Metric::P90ResponseTime => "p90_response_time",
            Metric::P95ResponseTime => "p95_response_time",
            Metric::P99ResponseTime => "p99_response_time",
            Metric::RequestsPerSecond => "requests_per_second",
            Metric::RequestsPerMinute => "requests_per_minute",
            Metric::TotalRequests => "total_requests",
            Metric::TotalErrors => "total_errors",
            Metric::CriticalErrors => "critical_errors",
            Metric::ErrorsLast24h => "errors_last_24h",
            Metric::UnresolvedErrors => "unresolved_errors",
            Metric::HealthStatus => "health_status",
            Metric::MemoryUsageMb => "memory_usage_mb",
            Metric::CpuTimeMs => "cpu_time_ms",
            Metric::Custom(name) => name.as_str(),
        }
    }
}

impl From<String> for Metric {
    fn from(name: String) -> Self {
        Metric::parse(&name)
    }
}

impl From<Metric> for String {
    fn from(metric: Metric) -> Self {
        metric.name().to_string()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Condition under which a rule fires
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub metric: Metric,
    pub operator: Operator,
    pub threshold: f64,
    /// Minimum time the condition must hold continuously before firing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
}

impl RuleCondition {
    pub fn new(metric: &str, operator: Operator, threshold: f64) -> Self {
        Self {
            metric: Metric::parse(metric),
            operator,
            threshold,
            duration_minutes: None,
        }
    }

    pub fn for_minutes(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    pub fn describe(&self) -> String {
        format!(
            "{} {} {}",
            self.metric,
            self.operator.symbol(),
            self.threshold
        )
    }
}

/// Operator-defined threshold rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub condition: RuleCondition,
    pub severity: Severity,
    pub enabled: bool,
    pub cooldown_minutes: u32,
}

type RuleRow = (
    &'static str,
    &'static str,
    AlertType,
    &'static str,
    Operator,
    f64,
    Severity,
    u32,
);

const DEFAULT_RULES: [RuleRow; 7] = [
    (
        "error-rate-warning",
        "High Error Rate",
        AlertType::Error,
        "error_rate",
        Operator::Gt,
        5.0,
        Severity::Medium,
        15,
    ),
    (
        "error-rate-critical",
        "Critical Error Rate",
        AlertType::Error,
        "error_rate",
        Operator::Gt,
        10.0,
        Severity::Critical,
        5,
    ),
    (
        "p95-latency-warning",
        "Slow Response Times",
        AlertType::Performance,
        "p95_response_time",
        Operator::Gt,
        2000.0,
        Severity::Medium,
        10,
    ),
    (
        "p95-latency-critical",
        "Very Slow Response Times",
        AlertType::Performance,
        "p95_response_time",
        Operator::Gt,
        5000.0,
        Severity::High,
        5,
    ),
    (
        "health-critical",
        "System Health Critical",
        AlertType::Health,
        "health_status",
        Operator::Eq,
        0.0,
        Severity::Critical,
        5,
    ),
    (
        "high-memory",
        "High Memory Usage",
        AlertType::Resource,
        "memory_usage_mb",
        Operator::Gt,
        512.0,
        Severity::Medium,
        30,
    ),
    (
        "multiple-critical-errors",
        "Multiple Critical Errors",
        AlertType::Error,
        "critical_errors",
        Operator::Gte,
        5.0,
        Severity::Critical,
        15,
    ),
];

/// The rule set a fresh engine starts with
pub fn default_rules() -> Vec<AlertRule> {
    DEFAULT_RULES
        .iter()
        .map(
            |&(id, name, alert_type, metric, operator, threshold, severity, cooldown_minutes)| {
                AlertRule {
                    id: id.to_string(),
                    name: name.to_string(),
                    alert_type,
                    condition: RuleCondition::new(metric, operator, threshold),
                    severity,
                    enabled: true,
                    cooldown_minutes,
                }
            },
        )
        .collect()
}

/// Live metric values a rule evaluation pass reads from
#[derive(Debug, Clone, Default)]
pub struct MetricSnapshot {
    pub performance: Option<PerformanceReport>,
    pub errors: Option<ErrorStats>,
    pub health: Option<HealthStatus>,
    /// Extra named values for `Metric::Custom`
    pub custom: HashMap<String, f64>,
}

impl MetricSnapshot {
    /// Resolve a metric, `None` when its source is absent from the snapshot
    pub fn value(&self, metric: &Metric) -> Option<f64> {
        let performance = self.performance.as_ref();
        let errors = self.errors.as_ref();

        match metric {
            Metric::ErrorRate => performance.map(|report| report.error_rate),
            Metric::AvgResponseTime => performance.map(|report| report.avg_response_time),
            Metric::P50ResponseTime => performance.map(|report| report.p50),
            Metric::P90ResponseTime => performance.map(|report| report.p90),
            Metric::P95ResponseTime => performance.map(|report| report.p95),
            Metric::P99ResponseTime => performance.map(|report| report.p99),
            Metric::RequestsPerSecond => performance.map(|report| report.requests_per_second),
            Metric::RequestsPerMinute => performance.map(|report| report.requests_per_minute),
            Metric::TotalRequests => performance.map(|report| report.total_requests as f64),
            Metric::TotalErrors => errors.map(|stats| stats.total as f64),
            Metric::CriticalErrors => {
                errors.map(|stats| stats.severity_count(Severity::Critical) as f64)
            }
            Metric::ErrorsLast24h => errors.map(|stats| stats.last_24h as f64),
            Metric::UnresolvedErrors => errors.map(|stats| stats.unresolved as f64),
            Metric::HealthStatus => self.health.map(HealthStatus::as_metric),
            Metric::MemoryUsageMb => performance
                .and_then(|report| report.resources)
                .map(|resources| resources.memory_mb),
            Metric::CpuTimeMs => performance
                .and_then(|report| report.resources)
                .and_then(|resources| resources.cpu_time_ms),
            Metric::Custom(name) => self.custom_value(name),
        }
    }

    fn custom_value(&self, name: &str) -> Option<f64> {
        if let Some(&value) = self.custom.get(name) {
            return Some(value);
        }
        let errors = self.errors.as_ref()?;
        if let Some(error_type) = name.strip_prefix("errors_by_type.") {
            return Some(errors.by_type.get(error_type).copied().unwrap_or(0) as f64);
        }
        if let Some(severity) = name.strip_prefix("errors_by_severity.") {
            return Severity::parse(severity).map(|severity| errors.severity_count(severity) as f64);
        }
        None
    }
}
