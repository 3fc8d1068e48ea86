/// Rule evaluation and alert history
pub mod alert_engine;
pub mod cooldown;
pub mod rules;

pub use alert_engine::{
    Alert, AlertData, AlertEngine, AlertFilter, AlertQueryResult, AlertStats,
};
pub use cooldown::CooldownTracker;
pub use rules::{
    default_rules, AlertRule, AlertType, Metric, MetricSnapshot, Operator, RuleCondition,
};
