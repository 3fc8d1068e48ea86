//! Structured log ring buffer
//!
//! This module provides the EventStore, which keeps the most recent log
//! entries newest-first in a bounded buffer, answers filtered and paginated
//! queries, and derives summary metrics over the filtered set.

use crate::aggregator::console::ConsoleOutput;
use crate::aggregator::log_metrics::LogMetrics;
use crate::error::ExportError;
use crate::events::{days_before, LogEntry, LogLevel, RequestContext, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default ring buffer capacity
pub const DEFAULT_MAX_LOGS: usize = 10_000;

/// Filter accepted by `EventStore::query` and `EventStore::export`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LogFilter {
    /// Accept only these levels (empty = all)
    pub levels: Vec<LogLevel>,
    /// Accept only these components (empty = all)
    pub components: Vec<String>,
    /// Case-insensitive substring over message, component and serialized data
    pub search: Option<String>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
    pub user_id: Option<String>,
    /// Keep only ERROR and CRITICAL entries
    pub errors_only: bool,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl LogFilter {
    /// Whether an entry passes every criterion except pagination
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if !self.levels.is_empty() && !self.levels.contains(&entry.level) {
            return false;
        }
        if !self.components.is_empty() && !self.components.contains(&entry.component) {
            return false;
        }
        if self.errors_only && !entry.level.is_error() {
            return false;
        }
        if self.from.is_some_and(|from| entry.timestamp < from) {
            return false;
        }
        if self.to.is_some_and(|to| entry.timestamp > to) {
            return false;
        }
        if let Some(user_id) = &self.user_id {
            if entry.context.user_id.as_deref() != Some(user_id.as_str()) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let data = entry
                .context
                .data
                .as_ref()
                .map(|data| data.to_string().to_lowercase())
                .unwrap_or_default();
            if !entry.message.to_lowercase().contains(&needle)
                && !entry.component.to_lowercase().contains(&needle)
                && !data.contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

/// Result of a filtered query
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQueryResult {
    /// The paginated slice, newest first
    pub entries: Vec<LogEntry>,
    /// Number of entries matching the filter before pagination
    pub total: usize,
    /// Metrics over the full filtered set
    pub metrics: LogMetrics,
}

/// Supported export document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// One pretty-printed JSON document with a header and all entries
    Json,
    /// Newline-delimited JSON, one entry per line
    NdJson,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportDocument<'a> {
    exported_at: Timestamp,
    total: usize,
    filter: &'a LogFilter,
    entries: &'a [LogEntry],
}

/// Bounded, newest-first store of structured log entries
///
/// Appends and the capacity truncation happen under a single lock, so
/// concurrent writers never lose entries or evict twice.
#[derive(Debug)]
pub struct EventStore {
    entries: Mutex<VecDeque<LogEntry>>,
    max_size: usize,
    console: ConsoleOutput,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOGS)
    }
}

impl EventStore {
    /// Create a store holding at most `max_size` entries
    ///
    /// # Examples
    ///
    /// ```
    /// use labwatch::aggregator::EventStore;
    /// use labwatch::events::{LogLevel, RequestContext};
    ///
    /// let store = EventStore::new(100);
    /// let id = store.record(LogLevel::Info, "started", "Core", RequestContext::default());
    /// assert!(store.get(&id).is_some());
    /// ```
    pub fn new(max_size: usize) -> Self {
        Self::with_console(max_size, ConsoleOutput::default())
    }

    /// Create a store with explicit console mirroring
    ///
    /// # Arguments
    ///
    /// * `max_size` - Capacity; the oldest entries are dropped past it
    /// * `console` - Where and how recorded entries are echoed to the log facade
    pub fn with_console(max_size: usize, console: ConsoleOutput) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_size.min(DEFAULT_MAX_LOGS))),
            max_size,
            console,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a new entry and return its id
    pub fn record(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        component: impl Into<String>,
        context: RequestContext,
    ) -> String {
        self.record_entry(LogEntry::new(level, message, component, context))
    }

    /// Record a fully built entry and return its id
    pub fn record_entry(&self, entry: LogEntry) -> String {
        self.console.emit(&entry);
        let id = entry.id.clone();

        let mut entries = self.lock();
        entries.push_front(entry);
        entries.truncate(self.max_size);
        id
    }

    /// Filtered, paginated query with metrics over the filtered set
    ///
    /// # Arguments
    ///
    /// * `filter` - Match criteria plus `offset`/`limit` pagination
    ///
    /// # Returns
    ///
    /// The requested page, the total number of matches and metrics computed
    /// over every match rather than the page
    pub fn query(&self, filter: &LogFilter) -> LogQueryResult {
        let matching = self.matching(filter);
        let total = matching.len();
        let metrics = LogMetrics::compute(&matching);

        let entries = matching
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();

        LogQueryResult {
            entries,
            total,
            metrics,
        }
    }

    /// Every entry matching the filter, ignoring pagination
    pub fn matching(&self, filter: &LogFilter) -> Vec<LogEntry> {
        self.lock()
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect()
    }

    /// Metrics over the whole buffer
    pub fn metrics(&self) -> LogMetrics {
        let entries: Vec<LogEntry> = self.lock().iter().cloned().collect();
        LogMetrics::compute(&entries)
    }

    /// Drop entries older than `days`, returning how many were removed
    ///
    /// An age too large to represent as a timestamp removes nothing.
    pub fn purge_older_than(&self, days: i64) -> usize {
        days_before(Utc::now(), days).map_or(0, |cutoff| self.purge_before(cutoff))
    }

    fn purge_before(&self, cutoff: Timestamp) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|entry| entry.timestamp >= cutoff);
        before - entries.len()
    }

    pub fn get(&self, id: &str) -> Option<LogEntry> {
        self.lock().iter().find(|entry| entry.id == id).cloned()
    }

    /// The `count` most recent entries
    pub fn recent(&self, count: usize) -> Vec<LogEntry> {
        self.lock().iter().take(count).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Serialize the full filtered log set
    ///
    /// Pagination fields of the filter are ignored: the export always
    /// carries every matching entry.
    pub fn export(&self, filter: &LogFilter, format: ExportFormat) -> Result<String, ExportError> {
        let entries = self.matching(filter);
        match format {
            ExportFormat::Json => {
                let document = ExportDocument {
                    exported_at: Utc::now(),
                    total: entries.len(),
                    filter,
                    entries: &entries,
                };
                Ok(serde_json::to_string_pretty(&document)?)
            }
            ExportFormat::NdJson => {
                let mut out = String::new();
                for entry in &entries {
                    out.push_str(&serde_json::to_string(entry)?);
                    out.push('\n');
                }
                Ok(out)
            }
        }
    }
}
