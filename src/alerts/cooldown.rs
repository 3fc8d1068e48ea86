use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Per-rule cooldown gate
///
/// Remembers when each rule last fired so the engine can suppress repeat
/// alerts until the rule's cooldown has elapsed.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    last_triggered: HashMap<String, DateTime<Utc>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `rule_id` fired less than `cooldown` before `now`
    pub fn is_cooling_down(&self, rule_id: &str, cooldown: Duration, now: DateTime<Utc>) -> bool {
        self.last_triggered
            .get(rule_id)
            .is_some_and(|&last| now - last < cooldown)
    }

    /// Record that `rule_id` fired at `timestamp`
    pub fn record_trigger_at(&mut self, rule_id: &str, timestamp: DateTime<Utc>) {
        self.last_triggered.insert(rule_id.to_string(), timestamp);
    }

    pub fn last_triggered(&self, rule_id: &str) -> Option<DateTime<Utc>> {
        self.last_triggered.get(rule_id).copied()
    }

    /// Forget a rule, e.g. when it is replaced
    pub fn clear(&mut self, rule_id: &str) {
        self.last_triggered.remove(rule_id);
    }
}
