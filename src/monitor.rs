//! Wiring of every component behind one handle
//!
//! `Monitor` owns the stores and hands out shared references. The host
//! application feeds it requests and exceptions and pulls views, exports and
//! alert evaluations from it.

use crate::aggregator::{ConsoleOutput, EventStore, ExportFormat, LogFilter};
use crate::alerts::{Alert, AlertEngine, MetricSnapshot};
use crate::config::Config;
use crate::error::ExportError;
use crate::events::{LogLevel, RequestContext};
use crate::health::{
    DataStore, DirObjectStore, HealthAggregator, HealthSettings, ObjectStore, SqlDataStore,
    SystemHealth, TcpDataStore, TokenSigner,
};
use crate::performance::PerformanceTracker;
use crate::registry::{ErrorContext, ErrorDetails, ErrorRegistry, ErrorReport};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const HTTP_COMPONENT: &str = "HTTP";

/// One completed request as seen by the host's HTTP layer
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub duration_ms: f64,
    pub user_id: Option<String>,
    pub request_id: Option<String>,
}

impl RequestRecord {
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        status_code: u16,
        duration_ms: f64,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            status_code,
            duration_ms,
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }

    fn level(&self) -> LogLevel {
        if self.status_code >= 500 {
            LogLevel::Error
        } else if self.status_code >= 400 {
            LogLevel::Warn
        } else {
            LogLevel::Info
        }
    }
}

/// Counts removed by `Monitor::purge`
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PurgeSummary {
    pub logs: usize,
    pub errors: usize,
    pub alerts: usize,
    pub performance_samples: usize,
}

impl PurgeSummary {
    pub fn total(&self) -> usize {
        self.logs + self.errors + self.alerts + self.performance_samples
    }
}

/// Shared handle to every monitoring component
#[derive(Debug, Clone)]
pub struct Monitor {
    events: Arc<EventStore>,
    errors: Arc<ErrorRegistry>,
    performance: Arc<PerformanceTracker>,
    health: Arc<HealthAggregator>,
    alerts: Arc<AlertEngine>,
}

impl Monitor {
    /// Build from configuration, deriving probe bindings from the `[health]` section
    pub fn new(config: &Config) -> Self {
        let data_store = Self::data_store_binding(config);
        let object_store = config
            .health
            .object_store_dir
            .as_ref()
            .map(|dir| Arc::new(DirObjectStore::new(dir)) as Arc<dyn ObjectStore>);
        Self::with_bindings(config, data_store, object_store)
    }

    /// The configured data-store binding
    ///
    /// A database URL gets a real `SELECT 1` probe. A bare address falls back
    /// to TCP reachability. A URL the driver cannot parse leaves the probe
    /// unbound, which reports the mock-mode warning.
    fn data_store_binding(config: &Config) -> Option<Arc<dyn DataStore>> {
        if let Some(url) = &config.health.database_url {
            return match SqlDataStore::connect_lazy(url, config.health.probe_timeout()) {
                Ok(store) => Some(Arc::new(store)),
                Err(e) => {
                    error!("Data-store probe disabled: {}", e);
                    None
                }
            };
        }
        config
            .health
            .data_store_addr
            .as_ref()
            .map(|addr| Arc::new(TcpDataStore::new(addr.clone())) as Arc<dyn DataStore>)
    }

    /// Build with explicit probe bindings
    pub fn with_bindings(
        config: &Config,
        data_store: Option<Arc<dyn DataStore>>,
        object_store: Option<Arc<dyn ObjectStore>>,
    ) -> Self {
        let console = if config.console.enabled {
            ConsoleOutput {
                enabled: true,
                color: config.console.color,
            }
        } else {
            ConsoleOutput::disabled()
        };
        let events = Arc::new(EventStore::with_console(config.storage.max_logs, console));
        let errors = Arc::new(ErrorRegistry::new(
            config.storage.max_errors,
            Arc::clone(&events),
        ));
        let performance = Arc::new(PerformanceTracker::new(
            config.performance,
            Arc::clone(&events),
        ));

        let mut health = HealthAggregator::new(
            TokenSigner::new(&config.health.signing_secret),
            Arc::clone(&errors),
            Arc::clone(&performance),
            HealthSettings {
                probe_timeout: config.health.probe_timeout(),
                version: config.health.version.clone(),
                environment: config.health.environment.clone(),
            },
        );
        if let Some(store) = data_store {
            health = health.with_data_store(store);
        }
        if let Some(store) = object_store {
            health = health.with_object_store(store);
        }

        let alerts = Arc::new(AlertEngine::new(
            config.storage.max_alerts,
            Arc::clone(&events),
        ));

        info!(
            "Monitor initialized ({} environment, {} alert rules)",
            config.health.environment,
            alerts.rules().len()
        );

        Self {
            events,
            errors,
            performance,
            health: Arc::new(health),
            alerts,
        }
    }

    pub fn events(&self) -> &Arc<EventStore> {
        &self.events
    }

    pub fn errors(&self) -> &Arc<ErrorRegistry> {
        &self.errors
    }

    pub fn performance(&self) -> &Arc<PerformanceTracker> {
        &self.performance
    }

    pub fn health(&self) -> &Arc<HealthAggregator> {
        &self.health
    }

    pub fn alerts(&self) -> &Arc<AlertEngine> {
        &self.alerts
    }

    /// Ingest one completed request: one log entry plus one performance sample
    ///
    /// Returns the id of the log entry.
    pub fn record_request(&self, request: RequestRecord) -> String {
        let message = format!(
            "{} {} {} - {:.0}ms",
            request.method, request.path, request.status_code, request.duration_ms
        );
        let context = RequestContext {
            request_id: request.request_id.clone(),
            user_id: request.user_id.clone(),
            method: Some(request.method.clone()),
            path: Some(request.path.clone()),
            duration_ms: Some(request.duration_ms),
            status_code: Some(request.status_code),
            ..Default::default()
        };

        let id = self
            .events
            .record(request.level(), message, HTTP_COMPONENT, context);
        self.performance
            .record_request(request.duration_ms, request.is_error());
        id
    }

    /// Ingest an unhandled exception as a classified error report
    pub fn record_exception(
        &self,
        error: ErrorDetails,
        context: ErrorContext,
        status_code: Option<u16>,
    ) -> ErrorReport {
        self.errors.report(error, context, status_code)
    }

    /// Gather live values for rule evaluation, running a fresh health check
    pub async fn snapshot(&self) -> MetricSnapshot {
        let health = self.health.check().await;
        MetricSnapshot {
            performance: Some(self.performance.report()),
            errors: Some(self.errors.stats()),
            health: Some(health.status),
            custom: Default::default(),
        }
    }

    /// Evaluate every alert rule against a fresh snapshot
    pub async fn evaluate_alerts(&self) -> Vec<Alert> {
        let snapshot = self.snapshot().await;
        let fired = self.alerts.evaluate(&snapshot);
        debug!("Alert evaluation produced {} alerts", fired.len());
        fired
    }

    pub async fn force_health_check(&self) -> SystemHealth {
        info!("Running forced health check");
        self.health.check().await
    }

    pub fn export_logs(
        &self,
        filter: &LogFilter,
        format: ExportFormat,
    ) -> Result<String, ExportError> {
        self.events.export(filter, format)
    }

    /// Drop everything older than `days` from every store
    ///
    /// # Arguments
    ///
    /// * `days` - Age cutoff; performance windows are purged at `days * 24` hours
    ///
    /// # Returns
    ///
    /// Per-store removal counts. An age too large to represent removes nothing.
    pub fn purge(&self, days: i64) -> PurgeSummary {
        let summary = PurgeSummary {
            logs: self.events.purge_older_than(days),
            errors: self.errors.purge_older_than(days),
            alerts: self.alerts.purge_older_than(days),
            performance_samples: self.performance.purge_older_than(days.saturating_mul(24)),
        };
        info!("Purged {} records older than {} days", summary.total(), days);
        summary
    }
}
