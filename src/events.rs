//! Core event types shared by every component
//!
//! This module defines the structured log entry, the request-correlation
//! fields attached to it, and the ordinal enums (log level, severity, health
//! status) that the stores and the alert engine agree on.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// The instant `days` before `now`
///
/// Negative ages count as zero. Returns `None` when the cutoff falls outside
/// the representable time range, which callers treat as "nothing is older".
pub fn days_before(now: Timestamp, days: i64) -> Option<Timestamp> {
    Duration::try_days(days.max(0)).and_then(|age| now.checked_sub_signed(age))
}

/// The instant `hours` before `now`, with the same rules as `days_before`
pub fn hours_before(now: Timestamp, hours: i64) -> Option<Timestamp> {
    Duration::try_hours(hours.max(0)).and_then(|age| now.checked_sub_signed(age))
}

/// Generate a fresh unique identifier with a short kind prefix
pub fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// Severity level of a structured log entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    /// All levels in ascending order
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Critical,
    ];

    /// Whether this level counts as an error for "errors only" filtering
    pub fn is_error(self) -> bool {
        matches!(self, LogLevel::Error | LogLevel::Critical)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional request-correlation fields attached to a log entry
///
/// Every field is optional and stored as given; nothing here is validated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl RequestContext {
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// A structured, immutable log entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Unique identifier assigned at insert
    pub id: String,
    /// When the entry was recorded
    pub timestamp: Timestamp,
    pub level: LogLevel,
    pub message: String,
    /// Free-form subsystem tag (e.g. "HTTP", "ErrorRegistry")
    pub component: String,
    #[serde(flatten)]
    pub context: RequestContext,
}

impl LogEntry {
    /// Build a new entry stamped with the current time and a fresh id
    pub fn new(
        level: LogLevel,
        message: impl Into<String>,
        component: impl Into<String>,
        context: RequestContext,
    ) -> Self {
        Self {
            id: new_id("log"),
            timestamp: Utc::now(),
            level,
            message: message.into(),
            component: component.into(),
            context,
        }
    }

    /// Override the timestamp, mainly for replaying historical entries
    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Coarse ordinal severity shared by error reports and alerts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|severity| severity.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three-state health verdict
///
/// Ordered so that `max` yields the worse of two verdicts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    /// Numeric encoding used by alert rules: critical=0, warning=1, healthy=2
    pub fn as_metric(self) -> f64 {
        match self {
            HealthStatus::Critical => 0.0,
            HealthStatus::Warning => 1.0,
            HealthStatus::Healthy => 2.0,
        }
    }

    /// Raise the status to `other` if it is worse; never downgrades
    pub fn escalate(&mut self, other: HealthStatus) {
        if other > *self {
            *self = other;
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cutoffs_within_range() {
        let now = Utc::now();
        assert_eq!(days_before(now, 2), Some(now - Duration::days(2)));
        assert_eq!(hours_before(now, 3), Some(now - Duration::hours(3)));
        assert_eq!(days_before(now, -5), Some(now));
    }

    #[test]
    fn test_cutoffs_out_of_range() {
        let now = Utc::now();
        assert_eq!(days_before(now, 200_000_000), None);
        assert_eq!(days_before(now, i64::MAX), None);
        assert_eq!(hours_before(now, i64::MAX / 10), None);
    }

    #[test]
    fn test_log_entry_serialization() {
        let entry = LogEntry::new(
            LogLevel::Error,
            "Database unreachable",
            "HTTP",
            RequestContext {
                request_id: Some("req-1".to_string()),
                status_code: Some(500),
                ..Default::default()
            },
        );

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["level"], "ERROR");
        assert_eq!(json["requestId"], "req-1");
        assert_eq!(json["statusCode"], 500);
        assert!(json.get("userId").is_none());

        let deserialized: LogEntry = serde_json::from_value(json).unwrap();
        assert_eq!(entry, deserialized);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = new_id("log");
        let b = new_id("log");
        assert_ne!(a, b);
        assert!(a.starts_with("log_"));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!(Severity::parse("CRITICAL"), Some(Severity::Critical));
        assert_eq!(Severity::parse("low"), Some(Severity::Low));
        assert_eq!(Severity::parse("urgent"), None);
    }

    #[test]
    fn test_health_status_escalation_never_downgrades() {
        let mut status = HealthStatus::Healthy;
        status.escalate(HealthStatus::Critical);
        status.escalate(HealthStatus::Warning);
        assert_eq!(status, HealthStatus::Critical);
    }

    #[test]
    fn test_health_status_metric_encoding() {
        assert_eq!(HealthStatus::Critical.as_metric(), 0.0);
        assert_eq!(HealthStatus::Warning.as_metric(), 1.0);
        assert_eq!(HealthStatus::Healthy.as_metric(), 2.0);
    }

    #[test]
    fn test_level_serialization() {
        assert_eq!(
            serde_json::to_string(&LogLevel::Critical).unwrap(),
            "\"CRITICAL\""
        );
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"WARN\"");
    }
}
