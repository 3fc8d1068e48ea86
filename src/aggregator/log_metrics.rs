//! Summary metrics derived from a set of log entries

use crate::events::{HealthStatus, LogEntry, LogLevel, Timestamp};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Number of recurring error groups reported
pub const TOP_ERRORS_LIMIT: usize = 10;
/// Window for counting distinct active users
pub const ACTIVE_USER_WINDOW_MINUTES: i64 = 30;
/// Component tag carried by request logs
pub const HTTP_COMPONENT: &str = "HTTP";

const ERROR_WARNING_THRESHOLD: usize = 10;
const WARN_WARNING_THRESHOLD: usize = 50;

/// A recurring error message grouped by component and message
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorFrequency {
    pub component: String,
    pub message: String,
    pub count: usize,
    pub last_seen: Timestamp,
}

/// Aggregate view over a filtered log set
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogMetrics {
    pub total: usize,
    pub by_level: BTreeMap<LogLevel, usize>,
    /// Most recent ERROR or CRITICAL entry
    pub last_error: Option<LogEntry>,
    /// Mean `durationMs` over HTTP entries, 0 when none carry a duration
    pub avg_response_time: f64,
    pub top_errors: Vec<ErrorFrequency>,
    /// Distinct user ids seen within the last 30 minutes
    pub active_users: usize,
    pub system_health: HealthStatus,
}

impl LogMetrics {
    /// Compute metrics relative to the current time
    pub fn compute(entries: &[LogEntry]) -> Self {
        Self::compute_at(entries, Utc::now())
    }

    /// Compute metrics relative to `now`
    pub fn compute_at(entries: &[LogEntry], now: Timestamp) -> Self {
        let mut by_level: BTreeMap<LogLevel, usize> =
            LogLevel::ALL.into_iter().map(|level| (level, 0)).collect();
        for entry in entries {
            *by_level.entry(entry.level).or_insert(0) += 1;
        }

        let last_error = entries
            .iter()
            .filter(|entry| entry.level.is_error())
            .max_by_key(|entry| entry.timestamp)
            .cloned();

        let durations: Vec<f64> = entries
            .iter()
            .filter(|entry| entry.component == HTTP_COMPONENT)
            .filter_map(|entry| entry.context.duration_ms)
            .collect();
        let avg_response_time = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };

        let user_cutoff = now - Duration::minutes(ACTIVE_USER_WINDOW_MINUTES);
        let active_users = entries
            .iter()
            .filter(|entry| entry.timestamp >= user_cutoff)
            .filter_map(|entry| entry.context.user_id.as_deref())
            .collect::<HashSet<_>>()
            .len();

        let count = |level: LogLevel| by_level.get(&level).copied().unwrap_or(0);
        let system_health = if count(LogLevel::Critical) > 0 {
            HealthStatus::Critical
        } else if count(LogLevel::Error) > ERROR_WARNING_THRESHOLD
            || count(LogLevel::Warn) > WARN_WARNING_THRESHOLD
        {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        Self {
            total: entries.len(),
            by_level,
            last_error,
            avg_response_time,
            top_errors: top_errors(entries),
            active_users,
            system_health,
        }
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.by_level.get(&level).copied().unwrap_or(0)
    }
}

fn top_errors(entries: &[LogEntry]) -> Vec<ErrorFrequency> {
    let mut groups: HashMap<(&str, &str), ErrorFrequency> = HashMap::new();
    for entry in entries.iter().filter(|entry| entry.level.is_error()) {
        groups
            .entry((entry.component.as_str(), entry.message.as_str()))
            .and_modify(|group| {
                group.count += 1;
                if entry.timestamp > group.last_seen {
                    group.last_seen = entry.timestamp;
                }
            })
            .or_insert_with(|| ErrorFrequency {
                component: entry.component.clone(),
                message: entry.message.clone(),
                count: 1,
                last_seen: entry.timestamp,
            });
    }

    let mut ranked: Vec<ErrorFrequency> = groups.into_values().collect();
    ranked.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| b.last_seen.cmp(&a.last_seen))
    });
    ranked.truncate(TOP_ERRORS_LIMIT);
    ranked
}
