//! Cooldown-gated rule evaluation and the bounded alert history
//!
//! Evaluation is pull-based: a caller builds a `MetricSnapshot` and hands it to
//! `evaluate`, there is no internal timer. Each enabled rule whose condition
//! holds (for at least its minimum duration, if one is set) and which is not
//! cooling down produces one alert and one WARN log entry.

use crate::aggregator::EventStore;
use crate::alerts::cooldown::CooldownTracker;
use crate::alerts::rules::{default_rules, AlertRule, AlertType, MetricSnapshot, RuleCondition};
use crate::events::{days_before, new_id, LogLevel, RequestContext, Severity, Timestamp};
use chrono::{Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default alert history capacity
pub const DEFAULT_MAX_ALERTS: usize = 1000;
/// Maximum alerts returned by `list` when no limit is given
pub const DEFAULT_LIST_LIMIT: usize = 100;

const COMPONENT: &str = "AlertEngine";

/// What triggered an alert
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertData {
    pub rule_id: String,
    pub condition: RuleCondition,
    /// Metric value observed when the rule fired
    pub value: f64,
}

/// A materialized alert
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub timestamp: Timestamp,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<Timestamp>,
    pub data: AlertData,
}

/// Filter accepted by `AlertEngine::list` and `AlertEngine::query`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertFilter {
    #[serde(rename = "type")]
    pub alert_type: Option<AlertType>,
    pub severity: Option<Severity>,
    pub resolved: Option<bool>,
    pub limit: Option<usize>,
}

impl AlertFilter {
    fn matches(&self, alert: &Alert) -> bool {
        self.alert_type.map_or(true, |t| alert.alert_type == t)
            && self.severity.map_or(true, |s| alert.severity == s)
            && self.resolved.map_or(true, |r| alert.resolved == r)
    }
}

/// Aggregate counts over the alert history
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertStats {
    pub total: usize,
    pub active: usize,
    pub resolved: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_type: BTreeMap<AlertType, usize>,
    pub last_24h: usize,
}

impl AlertStats {
    /// Aggregate over `alerts`, counting the last 24 hours relative to `now`
    pub fn compute<'a>(alerts: impl IntoIterator<Item = &'a Alert>, now: Timestamp) -> Self {
        let cutoff = now - Duration::hours(24);
        let mut stats = AlertStats::default();
        for alert in alerts {
            stats.total += 1;
            if alert.resolved {
                stats.resolved += 1;
            } else {
                stats.active += 1;
            }
            *stats.by_severity.entry(alert.severity).or_insert(0) += 1;
            *stats.by_type.entry(alert.alert_type).or_insert(0) += 1;
            if alert.timestamp >= cutoff {
                stats.last_24h += 1;
            }
        }
        stats
    }
}

/// Result of a filtered alert query
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertQueryResult {
    /// Matching alerts, newest first, capped at the filter limit
    pub alerts: Vec<Alert>,
    /// Number of alerts matching the filter before the cap
    pub total: usize,
    /// Counts over every matching alert
    pub stats: AlertStats,
}

#[derive(Debug, Default)]
struct EngineState {
    rules: Vec<AlertRule>,
    alerts: VecDeque<Alert>,
    cooldowns: CooldownTracker,
    breach_started: HashMap<String, Timestamp>,
}

/// Holds the rule set and the alert history
#[derive(Debug)]
pub struct AlertEngine {
    state: Mutex<EngineState>,
    max_alerts: usize,
    events: Arc<EventStore>,
}

impl AlertEngine {
    /// Engine preloaded with the default rule table
    pub fn new(max_alerts: usize, events: Arc<EventStore>) -> Self {
        Self::with_rules(max_alerts, default_rules(), events)
    }

    pub fn with_rules(max_alerts: usize, rules: Vec<AlertRule>, events: Arc<EventStore>) -> Self {
        Self {
            state: Mutex::new(EngineState {
                rules,
                ..Default::default()
            }),
            max_alerts,
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Evaluate every enabled rule, returning the alerts created
    pub fn evaluate(&self, snapshot: &MetricSnapshot) -> Vec<Alert> {
        self.evaluate_at(snapshot, Utc::now())
    }

    /// Evaluate every enabled rule as of `now`
    ///
    /// # Arguments
    ///
    /// * `snapshot` - Live metric values; rules on absent metrics are skipped
    /// * `now` - Evaluation time used for breach durations and cooldowns
    ///
    /// # Returns
    ///
    /// The alerts created by this pass, in rule order
    pub fn evaluate_at(&self, snapshot: &MetricSnapshot, now: Timestamp) -> Vec<Alert> {
        let mut fired = Vec::new();

        {
            let mut state = self.lock();
            let EngineState {
                rules,
                alerts,
                cooldowns,
                breach_started,
            } = &mut *state;

            for rule in rules.iter().filter(|rule| rule.enabled) {
                let Some(value) = snapshot.value(&rule.condition.metric) else {
                    debug!(
                        "Skipping rule {}: metric {} unavailable",
                        rule.id, rule.condition.metric
                    );
                    breach_started.remove(&rule.id);
                    continue;
                };

                if !rule.condition.operator.compare(value, rule.condition.threshold) {
                    breach_started.remove(&rule.id);
                    continue;
                }

                if let Some(minutes) = rule.condition.duration_minutes.filter(|&m| m > 0) {
                    let started = *breach_started.entry(rule.id.clone()).or_insert(now);
                    if now - started < Duration::minutes(minutes as i64) {
                        continue;
                    }
                }

                let cooldown = Duration::minutes(rule.cooldown_minutes as i64);
                if cooldowns.is_cooling_down(&rule.id, cooldown, now) {
                    continue;
                }

                let alert = Alert {
                    id: new_id("alert"),
                    alert_type: rule.alert_type,
                    severity: rule.severity,
                    title: rule.name.clone(),
                    message: format!(
                        "{}: {} is {:.2} (threshold {} {})",
                        rule.name,
                        rule.condition.metric,
                        value,
                        rule.condition.operator.symbol(),
                        rule.condition.threshold
                    ),
                    timestamp: now,
                    resolved: false,
                    resolved_at: None,
                    data: AlertData {
                        rule_id: rule.id.clone(),
                        condition: rule.condition.clone(),
                        value,
                    },
                };

                cooldowns.record_trigger_at(&rule.id, now);
                alerts.push_front(alert.clone());
                alerts.truncate(self.max_alerts);
                fired.push(alert);
            }
        }

        for alert in &fired {
            self.events.record(
                LogLevel::Warn,
                format!("Alert triggered: {}", alert.message),
                COMPONENT,
                RequestContext::default().with_data(json!({
                    "alertId": alert.id,
                    "ruleId": alert.data.rule_id,
                    "severity": alert.severity,
                    "value": alert.data.value,
                })),
            );
        }

        fired
    }

    /// Unresolved alerts, newest first
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.list(&AlertFilter {
            resolved: Some(false),
            limit: Some(usize::MAX),
            ..Default::default()
        })
    }

    pub fn list(&self, filter: &AlertFilter) -> Vec<Alert> {
        let limit = filter.limit.unwrap_or(DEFAULT_LIST_LIMIT);
        self.lock()
            .alerts
            .iter()
            .filter(|alert| filter.matches(alert))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Alert> {
        self.lock().alerts.iter().find(|alert| alert.id == id).cloned()
    }

    /// Mark an alert resolved; false if unknown or already resolved
    pub fn resolve(&self, id: &str) -> bool {
        let mut state = self.lock();
        match state.alerts.iter_mut().find(|alert| alert.id == id) {
            Some(alert) if !alert.resolved => {
                alert.resolved = true;
                alert.resolved_at = Some(Utc::now());
                info!("Resolved alert {}", id);
                true
            }
            _ => false,
        }
    }

    pub fn stats(&self) -> AlertStats {
        AlertStats::compute(&self.lock().alerts, Utc::now())
    }

    /// Filtered query with the pre-cap total and counts over all matches
    ///
    /// # Arguments
    ///
    /// * `filter` - Type, severity and resolution criteria plus the result cap
    ///
    /// # Returns
    ///
    /// At most `filter.limit` (default `DEFAULT_LIST_LIMIT`) alerts, newest
    /// first, with `total` and `stats` computed before the cap is applied
    pub fn query(&self, filter: &AlertFilter) -> AlertQueryResult {
        let matching: Vec<Alert> = self
            .lock()
            .alerts
            .iter()
            .filter(|alert| filter.matches(alert))
            .cloned()
            .collect();
        let total = matching.len();
        let stats = AlertStats::compute(&matching, Utc::now());
        let alerts = matching
            .into_iter()
            .take(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .collect();

        AlertQueryResult {
            alerts,
            total,
            stats,
        }
    }

    /// Insert a rule or replace the one with the same id
    ///
    /// Replacing a rule resets its cooldown and breach tracking.
    pub fn add_rule(&self, rule: AlertRule) {
        let mut state = self.lock();
        state.cooldowns.clear(&rule.id);
        state.breach_started.remove(&rule.id);
        match state.rules.iter_mut().find(|existing| existing.id == rule.id) {
            Some(existing) => *existing = rule,
            None => state.rules.push(rule),
        }
    }

    /// Enable or disable a rule; false if the id is unknown
    pub fn toggle_rule(&self, id: &str, enabled: bool) -> bool {
        let mut state = self.lock();
        let Some(rule) = state.rules.iter_mut().find(|rule| rule.id == id) else {
            return false;
        };
        rule.enabled = enabled;
        if !enabled {
            state.breach_started.remove(id);
        }
        true
    }

    pub fn rules(&self) -> Vec<AlertRule> {
        self.lock().rules.clone()
    }

    /// Drop alerts older than `days`, returning how many were removed
    pub fn purge_older_than(&self, days: i64) -> usize {
        let Some(cutoff) = days_before(Utc::now(), days) else {
            return 0;
        };
        let mut state = self.lock();
        let before = state.alerts.len();
        state.alerts.retain(|alert| alert.timestamp >= cutoff);
        before - state.alerts.len()
    }

    pub fn len(&self) -> usize {
        self.lock().alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
