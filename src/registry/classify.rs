//! Severity heuristic applied once when an error is reported

use crate::events::Severity;

const DATA_STORE_MARKERS: &[&str] = &["database", "connection", "sql", "datastore"];
const VALIDATION_MARKERS: &[&str] = &["validation", "invalid"];
const LOW_MARKERS: &[&str] = &["notfound", "not_found", "unauthorized"];
const AUTH_MARKERS: &[&str] = &["auth", "token", "jwt", "credential", "session"];

fn contains_any(haystack: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| haystack.contains(marker))
}

/// Classify an error by name, message and optional HTTP status
///
/// Rules are checked in order and the first match wins:
/// status >= 500 is critical, data-store/connection failures are critical,
/// validation errors are medium, not-found/unauthorized are low,
/// authentication/token problems are medium. Anything unrecognized is medium.
pub fn classify_severity(name: &str, message: &str, status_code: Option<u16>) -> Severity {
    if status_code.is_some_and(|status| status >= 500) {
        return Severity::Critical;
    }

    let name = name.to_lowercase();
    let message = message.to_lowercase();

    if contains_any(&name, DATA_STORE_MARKERS) {
        return Severity::Critical;
    }
    if contains_any(&name, VALIDATION_MARKERS) {
        return Severity::Medium;
    }
    if contains_any(&name, LOW_MARKERS) {
        return Severity::Low;
    }
    if contains_any(&name, AUTH_MARKERS) || contains_any(&message, AUTH_MARKERS) {
        return Severity::Medium;
    }
    Severity::Medium
}
