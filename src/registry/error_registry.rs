//! Bounded store of classified error reports
//!
//! Reports are classified once when they arrive, kept newest-first up to a
//! capacity ceiling, and can be resolved exactly once by an operator. Every
//! report is mirrored into the `EventStore` as an ERROR entry carrying the
//! report id so logs and reports can be correlated.

use crate::aggregator::EventStore;
use crate::events::{days_before, new_id, LogLevel, RequestContext, Severity, Timestamp};
use crate::registry::classify::classify_severity;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::error::Error as StdError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default report capacity
pub const DEFAULT_MAX_ERRORS: usize = 1000;
/// Maximum reports returned by `list` when no limit is given
pub const DEFAULT_LIST_LIMIT: usize = 100;
/// Maximum reports returned by `critical_unresolved`
pub const CRITICAL_UNRESOLVED_LIMIT: usize = 10;

const COMPONENT: &str = "ErrorRegistry";

/// Name, message and optional stack of a raised error
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDetails {
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorDetails {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Describe a Rust error value
    ///
    /// The name is the unqualified type name and the stack lists the
    /// `source()` chain, one cause per line.
    pub fn from_error<E: StdError>(err: &E) -> Self {
        let full_name = std::any::type_name::<E>();
        let base = full_name.split('<').next().unwrap_or(full_name);
        let name = base.rsplit("::").next().unwrap_or(base);

        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(format!("caused by: {}", cause));
            source = cause.source();
        }

        Self {
            name: name.to_string(),
            message: err.to_string(),
            stack: (!causes.is_empty()).then(|| causes.join("\n")),
        }
    }
}

/// Request context captured alongside an error
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    pub path: Option<String>,
    pub method: Option<String>,
    pub user_id: Option<String>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
}

/// A classified error report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub id: String,
    pub timestamp: Timestamp,
    pub error: ErrorDetails,
    pub context: ErrorContext,
    pub status_code: Option<u16>,
    /// Assigned once at creation, never recomputed
    pub severity: Severity,
    pub resolved: bool,
}

/// Aggregate statistics over the stored reports
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    pub total: usize,
    pub by_type: HashMap<String, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    pub last_24h: usize,
    pub resolved: usize,
    pub unresolved: usize,
}

impl ErrorStats {
    /// Aggregate over `reports`, counting the last 24 hours relative to `now`
    pub fn compute<'a>(reports: impl IntoIterator<Item = &'a ErrorReport>, now: Timestamp) -> Self {
        let day_ago = now - Duration::hours(24);
        let mut stats = ErrorStats {
            by_severity: Severity::ALL.into_iter().map(|severity| (severity, 0)).collect(),
            ..Default::default()
        };
        for report in reports {
            stats.total += 1;
            *stats.by_type.entry(report.error.name.clone()).or_insert(0) += 1;
            *stats.by_severity.entry(report.severity).or_insert(0) += 1;
            if report.timestamp >= day_ago {
                stats.last_24h += 1;
            }
            if report.resolved {
                stats.resolved += 1;
            } else {
                stats.unresolved += 1;
            }
        }
        stats
    }

    pub fn severity_count(&self, severity: Severity) -> usize {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }
}

/// Result of a filtered error query
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorQueryResult {
    /// Matching reports, newest first, capped at the filter limit
    pub reports: Vec<ErrorReport>,
    /// Number of reports matching the filter before the cap
    pub total: usize,
    /// Statistics over every matching report
    pub stats: ErrorStats,
}

/// Filter accepted by `ErrorRegistry::list` and `ErrorRegistry::query`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorFilter {
    pub severity: Option<Severity>,
    pub resolved: Option<bool>,
    /// Case-insensitive substring over error name, message and request path
    pub search: Option<String>,
    pub limit: Option<usize>,
}

impl ErrorFilter {
    fn matches(&self, report: &ErrorReport) -> bool {
        if self.severity.is_some_and(|severity| report.severity != severity) {
            return false;
        }
        if self.resolved.is_some_and(|resolved| report.resolved != resolved) {
            return false;
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let path = report.context.path.as_deref().unwrap_or_default();
            return report.error.name.to_lowercase().contains(&needle)
                || report.error.message.to_lowercase().contains(&needle)
                || path.to_lowercase().contains(&needle);
        }
        true
    }
}

/// Bounded, newest-first error report store
#[derive(Debug)]
pub struct ErrorRegistry {
    reports: Mutex<VecDeque<ErrorReport>>,
    max_size: usize,
    events: Arc<EventStore>,
}

impl ErrorRegistry {
    pub fn new(max_size: usize, events: Arc<EventStore>) -> Self {
        Self {
            reports: Mutex::new(VecDeque::new()),
            max_size,
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ErrorReport>> {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Classify, store and log an error
    ///
    /// # Arguments
    ///
    /// * `error` - Name, message and optional stack of the raised error
    /// * `context` - Request fields captured when the error was raised
    /// * `status_code` - HTTP status, when known; feeds the severity heuristic
    ///
    /// # Returns
    ///
    /// The stored report. Its id also appears in the correlated ERROR log entry.
    pub fn report(
        &self,
        error: ErrorDetails,
        context: ErrorContext,
        status_code: Option<u16>,
    ) -> ErrorReport {
        let severity = classify_severity(&error.name, &error.message, status_code);
        let report = ErrorReport {
            id: new_id("err"),
            timestamp: Utc::now(),
            error,
            context,
            status_code,
            severity,
            resolved: false,
        };

        {
            let mut reports = self.lock();
            reports.push_front(report.clone());
            reports.truncate(self.max_size);
        }

        self.events.record(
            LogLevel::Error,
            format!("{}: {}", report.error.name, report.error.message),
            COMPONENT,
            RequestContext {
                data: Some(json!({
                    "errorId": report.id,
                    "severity": report.severity,
                    "errorName": report.error.name,
                })),
                user_id: report.context.user_id.clone(),
                method: report.context.method.clone(),
                path: report.context.path.clone(),
                status_code,
                ..Default::default()
            },
        );

        report
    }

    pub fn stats(&self) -> ErrorStats {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: Timestamp) -> ErrorStats {
        ErrorStats::compute(self.lock().iter(), now)
    }

    /// Filtered query with the pre-cap total and statistics over all matches
    ///
    /// # Arguments
    ///
    /// * `filter` - Severity, resolution and text criteria plus the result cap
    ///
    /// # Returns
    ///
    /// At most `filter.limit` (default `DEFAULT_LIST_LIMIT`) reports, newest
    /// first, with `total` and `stats` computed before the cap is applied
    pub fn query(&self, filter: &ErrorFilter) -> ErrorQueryResult {
        let matching: Vec<ErrorReport> = self
            .lock()
            .iter()
            .filter(|report| filter.matches(report))
            .cloned()
            .collect();
        let total = matching.len();
        let stats = ErrorStats::compute(&matching, Utc::now());
        let reports = matching
            .into_iter()
            .take(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .collect();

        ErrorQueryResult {
            reports,
            total,
            stats,
        }
    }

    /// Reports matching the filter, newest first, capped at the filter limit
    pub fn list(&self, filter: &ErrorFilter) -> Vec<ErrorReport> {
        self.lock()
            .iter()
            .filter(|report| filter.matches(report))
            .take(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<ErrorReport> {
        self.lock().iter().find(|report| report.id == id).cloned()
    }

    /// Mark a report resolved
    ///
    /// Returns `true` only when an unresolved report was flipped. Unknown ids
    /// and already-resolved reports return `false`; nothing ever un-resolves.
    pub fn resolve(&self, id: &str) -> bool {
        let mut reports = self.lock();
        match reports.iter_mut().find(|report| report.id == id) {
            Some(report) if !report.resolved => {
                report.resolved = true;
                true
            }
            _ => false,
        }
    }

    /// The most recent unresolved critical reports
    pub fn critical_unresolved(&self) -> Vec<ErrorReport> {
        self.lock()
            .iter()
            .filter(|report| report.severity == Severity::Critical && !report.resolved)
            .take(CRITICAL_UNRESOLVED_LIMIT)
            .cloned()
            .collect()
    }

    /// Drop reports older than `days`, returning how many were removed
    pub fn purge_older_than(&self, days: i64) -> usize {
        let Some(cutoff) = days_before(Utc::now(), days) else {
            return 0;
        };
        let mut reports = self.lock();
        let before = reports.len();
        reports.retain(|report| report.timestamp >= cutoff);
        before - reports.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, id: &str, timestamp: Timestamp) {
        if let Some(report) = self.lock().iter_mut().find(|report| report.id == id) {
            report.timestamp = timestamp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{ConsoleOutput, LogFilter};
    use std::fmt;

    fn registry(capacity: usize) -> (ErrorRegistry, Arc<EventStore>) {
        let events = Arc::new(EventStore::with_console(1000, ConsoleOutput::disabled()));
        (ErrorRegistry::new(capacity, Arc::clone(&events)), events)
    }

    fn context(path: &str) -> ErrorContext {
        ErrorContext {
            path: Some(path.to_string()),
            method: Some("POST".to_string()),
            user_id: Some("u-7".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_report_classifies_and_logs() {
        let (registry, events) = registry(10);
        let report = registry.report(
            ErrorDetails::new("DatabaseError", "connection reset"),
            context("/projects"),
            None,
        );

        assert_eq!(report.severity, Severity::Critical);
        assert!(!report.resolved);

        let logged = events.query(&LogFilter {
            components: vec![COMPONENT.to_string()],
            ..Default::default()
        });
        assert_eq!(logged.total, 1);
        let entry = &logged.entries[0];
        assert_eq!(entry.level, LogLevel::Error);
        assert_eq!(entry.context.data.as_ref().unwrap()["errorId"], report.id.as_str());
        assert_eq!(entry.context.path.as_deref(), Some("/projects"));
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let (registry, _) = registry(3);
        for i in 0..5 {
            registry.report(ErrorDetails::new("Error", format!("e{}", i)), context("/"), None);
        }
        let all = registry.list(&ErrorFilter::default());
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].error.message, "e4");
        assert_eq!(all[2].error.message, "e2");
    }

    #[test]
    fn test_stats() {
        let (registry, _) = registry(100);
        registry.report(ErrorDetails::new("ValidationError", "bad"), context("/a"), Some(422));
        registry.report(ErrorDetails::new("ValidationError", "bad"), context("/a"), Some(422));
        let critical = registry.report(ErrorDetails::new("Error", "crash"), context("/b"), Some(500));
        let old = registry.report(ErrorDetails::new("NotFoundError", "gone"), context("/c"), Some(404));
        registry.backdate(&old.id, Utc::now() - Duration::hours(30));
        registry.resolve(&critical.id);

        let stats = registry.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.by_type["ValidationError"], 2);
        assert_eq!(stats.severity_count(Severity::Medium), 2);
        assert_eq!(stats.severity_count(Severity::Critical), 1);
        assert_eq!(stats.severity_count(Severity::Low), 1);
        assert_eq!(stats.severity_count(Severity::High), 0);
        assert_eq!(stats.last_24h, 3);
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.unresolved, 3);
    }

    #[test]
    fn test_list_filters() {
        let (registry, _) = registry(100);
        registry.report(ErrorDetails::new("ValidationError", "title"), context("/news"), None);
        let db = registry.report(ErrorDetails::new("DatabaseError", "down"), context("/files"), None);
        registry.report(ErrorDetails::new("Error", "weird"), context("/events"), None);
        registry.resolve(&db.id);

        let by_severity = registry.list(&ErrorFilter {
            severity: Some(Severity::Critical),
            ..Default::default()
        });
        assert_eq!(by_severity.len(), 1);

        let unresolved = registry.list(&ErrorFilter {
            resolved: Some(false),
            ..Default::default()
        });
        assert_eq!(unresolved.len(), 2);

        let by_path = registry.list(&ErrorFilter {
            search: Some("NEWS".to_string()),
            ..Default::default()
        });
        assert_eq!(by_path[0].error.name, "ValidationError");

        let capped = registry.list(&ErrorFilter {
            limit: Some(1),
            ..Default::default()
        });
        assert_eq!(capped.len(), 1);
    }

    #[test]
    fn test_resolve_is_monotonic() {
        let (registry, _) = registry(10);
        let report = registry.report(ErrorDetails::new("Error", "x"), context("/"), None);

        assert!(registry.resolve(&report.id));
        assert!(!registry.resolve(&report.id));
        assert!(registry.get(&report.id).unwrap().resolved);
        assert!(!registry.resolve("err_unknown"));
    }

    #[test]
    fn test_critical_unresolved_capped() {
        let (registry, _) = registry(100);
        for i in 0..15 {
            registry.report(ErrorDetails::new("Error", format!("c{}", i)), context("/"), Some(500));
        }
        registry.report(ErrorDetails::new("ValidationError", "v"), context("/"), None);

        let critical = registry.critical_unresolved();
        assert_eq!(critical.len(), CRITICAL_UNRESOLVED_LIMIT);
        assert_eq!(critical[0].error.message, "c14");

        registry.resolve(&critical[0].id);
        assert_eq!(registry.critical_unresolved()[0].error.message, "c13");
    }

    #[test]
    fn test_purge_older_than() {
        let (registry, _) = registry(10);
        let old = registry.report(ErrorDetails::new("Error", "old"), context("/"), None);
        registry.report(ErrorDetails::new("Error", "new"), context("/"), None);
        registry.backdate(&old.id, Utc::now() - Duration::days(40));

        assert_eq!(registry.purge_older_than(30), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_purge_with_unrepresentable_age_removes_nothing() {
        let (registry, _) = registry(10);
        registry.report(ErrorDetails::new("Error", "kept"), context("/"), None);

        assert_eq!(registry.purge_older_than(200_000_000), 0);
        assert_eq!(registry.purge_older_than(i64::MAX), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_query_total_counts_past_the_limit() {
        let (registry, _) = registry(100);
        for i in 0..7 {
            registry.report(ErrorDetails::new("ValidationError", format!("v{}", i)), context("/a"), None);
        }
        let db = registry.report(ErrorDetails::new("DatabaseError", "down"), context("/b"), None);
        registry.resolve(&db.id);

        let result = registry.query(&ErrorFilter {
            severity: Some(Severity::Medium),
            limit: Some(3),
            ..Default::default()
        });
        assert_eq!(result.reports.len(), 3);
        assert_eq!(result.total, 7);
        assert_eq!(result.reports[0].error.message, "v6");
        // stats cover every match, not the capped page
        assert_eq!(result.stats.total, 7);
        assert_eq!(result.stats.by_type["ValidationError"], 7);
        assert_eq!(result.stats.severity_count(Severity::Critical), 0);
        assert_eq!(result.stats.unresolved, 7);

        let everything = registry.query(&ErrorFilter::default());
        assert_eq!(everything.total, 8);
        assert_eq!(everything.stats.resolved, 1);
    }

    #[test]
    fn test_concurrent_reports_respect_capacity() {
        let (registry, _) = registry(50);
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..40 {
                        registry.report(
                            ErrorDetails::new("Error", format!("t{}-{}", t, i)),
                            ErrorContext::default(),
                            None,
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let kept = registry.query(&ErrorFilter {
            limit: Some(usize::MAX),
            ..Default::default()
        });
        assert_eq!(registry.len(), 50);
        assert_eq!(kept.total, 50);
        let ids: std::collections::HashSet<_> = kept.reports.iter().map(|r| &r.id).collect();
        assert_eq!(ids.len(), 50);
    }

    #[derive(Debug)]
    struct RootCause;

    impl fmt::Display for RootCause {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "socket closed")
        }
    }

    impl StdError for RootCause {}

    #[derive(Debug)]
    struct ConnectionError(RootCause);

    impl fmt::Display for ConnectionError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "lost connection to store")
        }
    }

    impl StdError for ConnectionError {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_error_details_from_error() {
        let details = ErrorDetails::from_error(&ConnectionError(RootCause));
        assert_eq!(details.name, "ConnectionError");
        assert_eq!(details.message, "lost connection to store");
        assert_eq!(details.stack.as_deref(), Some("caused by: socket closed"));

        let (registry, _) = registry(10);
        let report = registry.report(details, ErrorContext::default(), None);
        assert_eq!(report.severity, Severity::Critical);
    }
}
