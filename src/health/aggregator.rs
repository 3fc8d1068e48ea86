//! Concurrent multi-probe health aggregation
//!
//! `check` runs four probes at once: data store, object store, credential
//! signing and internal monitoring. Each probe runs in its own task behind its
//! own timeout, so a hung dependency, an error or even a panic only turns that
//! probe critical. The overall verdict is the worst probe verdict.

use crate::error::ProbeError;
use crate::events::{new_id, HealthStatus, Severity, Timestamp};
use crate::health::probes::{DataStore, ObjectStore};
use crate::health::signing::TokenSigner;
use crate::performance::PerformanceTracker;
use crate::registry::ErrorRegistry;
use chrono::Utc;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

pub const DATABASE_CHECK: &str = "database";
pub const OBJECT_STORAGE_CHECK: &str = "object_storage";
pub const AUTHENTICATION_CHECK: &str = "authentication";
pub const MONITORING_CHECK: &str = "monitoring";

const CRITICAL_ERRORS_LIMIT: usize = 10;
const DAILY_ERRORS_LIMIT: usize = 50;
const SLOW_REQUESTS_LIMIT: usize = 10;
const SLOW_REQUEST_MS: f64 = 2000.0;

/// Result of one probe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    pub name: String,
    pub status: HealthStatus,
    pub message: String,
    pub response_time_ms: f64,
    pub timestamp: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Figures sourced from the other components
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetrics {
    pub total_requests: u64,
    pub error_rate: f64,
    pub avg_response_time: f64,
    pub memory_usage_mb: Option<f64>,
}

/// Aggregated verdict returned by `HealthAggregator::check`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub timestamp: Timestamp,
    pub uptime_seconds: u64,
    pub version: String,
    pub environment: String,
    pub checks: Vec<HealthCheckResult>,
    pub metrics: HealthMetrics,
}

/// Static identity reported alongside every check
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSettings {
    pub probe_timeout: Duration,
    pub version: String,
    pub environment: String,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_millis(2000),
            version: "1.0.0".to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Verdict a probe body produces before timing is attached
struct ProbeOutcome {
    status: HealthStatus,
    message: String,
    details: Option<Value>,
}

impl ProbeOutcome {
    fn new(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Runs the probe set and folds it into one status
pub struct HealthAggregator {
    data_store: Option<Arc<dyn DataStore>>,
    object_store: Option<Arc<dyn ObjectStore>>,
    signer: TokenSigner,
    errors: Arc<ErrorRegistry>,
    performance: Arc<PerformanceTracker>,
    settings: HealthSettings,
    started: Instant,
    last: Mutex<Option<SystemHealth>>,
}

impl std::fmt::Debug for HealthAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthAggregator")
            .field("data_store", &self.data_store.is_some())
            .field("object_store", &self.object_store.is_some())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl HealthAggregator {
    /// Create an aggregator with no data-store or object-store binding
    ///
    /// # Arguments
    ///
    /// * `signer` - Signs and verifies the round-trip token of the authentication probe
    /// * `errors` - Source of the critical and daily error counts
    /// * `performance` - Source of the slow request count
    /// * `settings` - Probe timeout plus the version and environment to report
    pub fn new(
        signer: TokenSigner,
        errors: Arc<ErrorRegistry>,
        performance: Arc<PerformanceTracker>,
        settings: HealthSettings,
    ) -> Self {
        Self {
            data_store: None,
            object_store: None,
            signer,
            errors,
            performance,
            settings,
            started: Instant::now(),
            last: Mutex::new(None),
        }
    }

    /// Bind the data store probed by the database check
    ///
    /// Without a binding the database check reports warning (mock mode)
    /// rather than critical.
    pub fn with_data_store(mut self, store: Arc<dyn DataStore>) -> Self {
        self.data_store = Some(store);
        self
    }

    /// Bind the object store used for the write-read-delete round trip
    ///
    /// Without a binding the object storage check reports warning.
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Most recent full check, if one has run
    pub fn last(&self) -> Option<SystemHealth> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Status of the most recent full check
    pub fn last_status(&self) -> Option<HealthStatus> {
        self.last().map(|health| health.status)
    }

    /// Run every probe concurrently and aggregate the results
    ///
    /// Each probe runs in its own task under the configured timeout. A probe
    /// that errors, times out or panics yields a critical result without
    /// affecting the others.
    ///
    /// # Returns
    ///
    /// The aggregated health, which is also kept as the last result
    pub async fn check(&self) -> SystemHealth {
        let timeout = self.settings.probe_timeout;

        let (database, object_storage, authentication, monitoring) = tokio::join!(
            run_probe(DATABASE_CHECK, timeout, data_store_probe(self.data_store.clone())),
            run_probe(
                OBJECT_STORAGE_CHECK,
                timeout,
                object_store_probe(self.object_store.clone())
            ),
            run_probe(
                AUTHENTICATION_CHECK,
                timeout,
                signing_probe(self.signer.clone())
            ),
            run_probe(
                MONITORING_CHECK,
                timeout,
                monitoring_probe(Arc::clone(&self.errors), Arc::clone(&self.performance))
            ),
        );

        let checks = vec![database, object_storage, authentication, monitoring];
        let status = overall_status(&checks);
        let report = self.performance.report();

        let health = SystemHealth {
            status,
            timestamp: Utc::now(),
            uptime_seconds: self.uptime().as_secs(),
            version: self.settings.version.clone(),
            environment: self.settings.environment.clone(),
            checks,
            metrics: HealthMetrics {
                total_requests: report.total_requests,
                error_rate: report.error_rate,
                avg_response_time: report.avg_response_time,
                memory_usage_mb: report.resources.map(|resources| resources.memory_mb),
            },
        };

        if health.status != HealthStatus::Healthy {
            warn!("System health is {}", health.status);
        }
        debug!("Health check completed: {}", health.status);

        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(health.clone());
        health
    }

    /// Only the data-store probe, for liveness pings
    pub async fn quick_check(&self) -> HealthCheckResult {
        run_probe(
            DATABASE_CHECK,
            self.settings.probe_timeout,
            data_store_probe(self.data_store.clone()),
        )
        .await
    }
}

/// Worst verdict among the checks, healthy when there are none
pub fn overall_status(checks: &[HealthCheckResult]) -> HealthStatus {
    checks
        .iter()
        .map(|check| check.status)
        .max()
        .unwrap_or(HealthStatus::Healthy)
}

/// Run a probe body in its own task under a timeout
///
/// Errors, timeouts and panics all become critical results.
async fn run_probe<F>(name: &str, timeout: Duration, probe: F) -> HealthCheckResult
where
    F: Future<Output = Result<ProbeOutcome, ProbeError>> + Send + 'static,
{
    let started = Instant::now();
    let handle = tokio::spawn(tokio::time::timeout(timeout, probe));

    let outcome = match handle.await {
        Ok(Ok(Ok(outcome))) => outcome,
        Ok(Ok(Err(e))) => ProbeOutcome::new(HealthStatus::Critical, e.to_string()),
        Ok(Err(_elapsed)) => ProbeOutcome::new(
            HealthStatus::Critical,
            ProbeError::Timeout(timeout.as_millis() as u64).to_string(),
        ),
        Err(join_error) => ProbeOutcome::new(
            HealthStatus::Critical,
            ProbeError::Aborted(join_error.to_string()).to_string(),
        ),
    };

    if outcome.status == HealthStatus::Critical {
        warn!("Health probe {} failed: {}", name, outcome.message);
    }

    HealthCheckResult {
        name: name.to_string(),
        status: outcome.status,
        message: outcome.message,
        response_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        timestamp: Utc::now(),
        details: outcome.details,
    }
}

async fn data_store_probe(
    store: Option<Arc<dyn DataStore>>,
) -> Result<ProbeOutcome, ProbeError> {
    let Some(store) = store else {
        return Ok(ProbeOutcome::new(
            HealthStatus::Warning,
            "No data store configured, running in mock mode",
        ));
    };
    store.probe_query().await?;
    Ok(ProbeOutcome::new(
        HealthStatus::Healthy,
        "Data store connection successful",
    ))
}

async fn object_store_probe(
    store: Option<Arc<dyn ObjectStore>>,
) -> Result<ProbeOutcome, ProbeError> {
    let Some(store) = store else {
        return Ok(ProbeOutcome::new(
            HealthStatus::Warning,
            "No object store configured",
        ));
    };

    let key = new_id("health-check");
    let content = format!("health check {}", Utc::now().to_rfc3339());
    store.put(&key, content.as_bytes()).await?;
    let fetched = store.get(&key).await;
    // Clean up even when the read failed
    let deleted = store.delete(&key).await;
    let fetched = fetched?;
    deleted?;

    let outcome = match fetched {
        Some(bytes) if bytes == content.as_bytes() => {
            ProbeOutcome::new(HealthStatus::Healthy, "Object store round trip successful")
        }
        Some(_) => ProbeOutcome::new(
            HealthStatus::Warning,
            "Object store returned different content",
        ),
        None => ProbeOutcome::new(
            HealthStatus::Warning,
            "Object store returned nothing for the written object",
        ),
    };
    Ok(outcome.with_details(json!({ "key": key })))
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct SigningProbePayload {
    user_id: String,
    purpose: String,
}

async fn signing_probe(signer: TokenSigner) -> Result<ProbeOutcome, ProbeError> {
    let payload = SigningProbePayload {
        user_id: new_id("probe"),
        purpose: "health-check".to_string(),
    };
    let token = signer.sign(&payload)?;
    let verified: SigningProbePayload = signer.verify(&token)?;

    if verified == payload {
        Ok(ProbeOutcome::new(
            HealthStatus::Healthy,
            "Token sign and verify round trip successful",
        ))
    } else {
        Ok(ProbeOutcome::new(
            HealthStatus::Critical,
            "Verified token payload does not match",
        ))
    }
}

async fn monitoring_probe(
    errors: Arc<ErrorRegistry>,
    performance: Arc<PerformanceTracker>,
) -> Result<ProbeOutcome, ProbeError> {
    let stats = errors.stats();
    let critical_errors = stats.severity_count(Severity::Critical);
    let slow_requests = performance.slow_requests(SLOW_REQUEST_MS).len();

    let outcome = if critical_errors > CRITICAL_ERRORS_LIMIT {
        ProbeOutcome::new(
            HealthStatus::Critical,
            format!("{} critical errors recorded", critical_errors),
        )
    } else if stats.last_24h > DAILY_ERRORS_LIMIT {
        ProbeOutcome::new(
            HealthStatus::Warning,
            format!("{} errors in the last 24 hours", stats.last_24h),
        )
    } else if slow_requests > SLOW_REQUESTS_LIMIT {
        ProbeOutcome::new(
            HealthStatus::Warning,
            format!("{} slow requests recorded", slow_requests),
        )
    } else {
        ProbeOutcome::new(HealthStatus::Healthy, "Monitoring systems operational")
    };

    Ok(outcome.with_details(json!({
        "criticalErrors": critical_errors,
        "errorsLast24h": stats.last_24h,
        "slowRequests": slow_requests,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{ConsoleOutput, EventStore};
    use crate::health::probes::{MemoryObjectStore, MockDataStore, MockObjectStore};
    use crate::performance::PerformanceSettings;
    use crate::registry::{ErrorContext, ErrorDetails};
    use async_trait::async_trait;

    struct Components {
        errors: Arc<ErrorRegistry>,
        performance: Arc<PerformanceTracker>,
    }

    fn components() -> Components {
        let events = Arc::new(EventStore::with_console(1000, ConsoleOutput::disabled()));
        Components {
            errors: Arc::new(ErrorRegistry::new(1000, Arc::clone(&events))),
            performance: Arc::new(
                PerformanceTracker::new(PerformanceSettings::default(), events)
                    .with_resource_sampler(|| None),
            ),
        }
    }

    fn aggregator(components: &Components) -> HealthAggregator {
        HealthAggregator::new(
            TokenSigner::new("test-secret"),
            Arc::clone(&components.errors),
            Arc::clone(&components.performance),
            HealthSettings {
                probe_timeout: Duration::from_millis(200),
                ..Default::default()
            },
        )
    }

    fn healthy_data_store() -> Arc<dyn DataStore> {
        let mut store = MockDataStore::new();
        store.expect_probe_query().returning(|| Ok(()));
        Arc::new(store)
    }

    fn find<'a>(health: &'a SystemHealth, name: &str) -> &'a HealthCheckResult {
        health
            .checks
            .iter()
            .find(|check| check.name == name)
            .unwrap()
    }

    #[tokio::test]
    async fn test_all_bindings_healthy() {
        let components = components();
        let health = aggregator(&components)
            .with_data_store(healthy_data_store())
            .with_object_store(Arc::new(MemoryObjectStore::new()))
            .check()
            .await;

        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.checks.len(), 4);
        assert!(health
            .checks
            .iter()
            .all(|check| check.status == HealthStatus::Healthy));
        assert_eq!(health.version, "1.0.0");
        assert_eq!(health.environment, "development");
    }

    #[tokio::test]
    async fn test_missing_bindings_are_warnings() {
        let components = components();
        let health = aggregator(&components).check().await;

        assert_eq!(health.status, HealthStatus::Warning);
        assert_eq!(find(&health, DATABASE_CHECK).status, HealthStatus::Warning);
        assert!(find(&health, DATABASE_CHECK).message.contains("mock mode"));
        assert_eq!(
            find(&health, OBJECT_STORAGE_CHECK).status,
            HealthStatus::Warning
        );
        assert_eq!(
            find(&health, AUTHENTICATION_CHECK).status,
            HealthStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_one_critical_probe_dominates() {
        let components = components();
        let mut store = MockDataStore::new();
        store
            .expect_probe_query()
            .returning(|| Err(ProbeError::Connection("refused".to_string())));

        let health = aggregator(&components)
            .with_data_store(Arc::new(store))
            .with_object_store(Arc::new(MemoryObjectStore::new()))
            .check()
            .await;

        assert_eq!(health.status, HealthStatus::Critical);
        let database = find(&health, DATABASE_CHECK);
        assert_eq!(database.status, HealthStatus::Critical);
        assert!(database.message.contains("refused"));
        assert_eq!(
            find(&health, MONITORING_CHECK).status,
            HealthStatus::Healthy
        );
    }

    struct HangingStore;

    #[async_trait]
    impl DataStore for HangingStore {
        async fn probe_query(&self) -> Result<(), ProbeError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_hanging_probe_times_out() {
        let components = components();
        let aggregator = aggregator(&components).with_data_store(Arc::new(HangingStore));

        let started = Instant::now();
        let result = aggregator.quick_check().await;

        assert_eq!(result.status, HealthStatus::Critical);
        assert!(result.message.contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    struct PanickingStore;

    #[async_trait]
    impl DataStore for PanickingStore {
        async fn probe_query(&self) -> Result<(), ProbeError> {
            panic!("driver bug");
        }
    }

    #[tokio::test]
    async fn test_panicking_probe_is_critical_and_isolated() {
        let components = components();
        let health = aggregator(&components)
            .with_data_store(Arc::new(PanickingStore))
            .with_object_store(Arc::new(MemoryObjectStore::new()))
            .check()
            .await;

        assert_eq!(health.status, HealthStatus::Critical);
        assert_eq!(find(&health, DATABASE_CHECK).status, HealthStatus::Critical);
        assert_eq!(
            find(&health, OBJECT_STORAGE_CHECK).status,
            HealthStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_object_store_returning_nothing_is_warning() {
        let components = components();
        let mut store = MockObjectStore::new();
        store.expect_put().returning(|_, _| Ok(()));
        store.expect_get().returning(|_| Ok(None));
        store.expect_delete().times(1).returning(|_| Ok(()));

        let health = aggregator(&components)
            .with_data_store(healthy_data_store())
            .with_object_store(Arc::new(store))
            .check()
            .await;

        assert_eq!(
            find(&health, OBJECT_STORAGE_CHECK).status,
            HealthStatus::Warning
        );
        assert_eq!(health.status, HealthStatus::Warning);
    }

    #[tokio::test]
    async fn test_object_store_error_is_critical() {
        let components = components();
        let mut store = MockObjectStore::new();
        store
            .expect_put()
            .returning(|_, _| Err(ProbeError::Storage("disk full".to_string())));

        let health = aggregator(&components)
            .with_object_store(Arc::new(store))
            .check()
            .await;

        assert_eq!(
            find(&health, OBJECT_STORAGE_CHECK).status,
            HealthStatus::Critical
        );
    }

    #[tokio::test]
    async fn test_monitoring_probe_critical_errors() {
        let components = components();
        for _ in 0..11 {
            components.errors.report(
                ErrorDetails::new("DatabaseError", "connection lost"),
                ErrorContext::default(),
                None,
            );
        }

        let health = aggregator(&components).check().await;
        assert_eq!(find(&health, MONITORING_CHECK).status, HealthStatus::Critical);
        assert_eq!(health.status, HealthStatus::Critical);
    }

    #[tokio::test]
    async fn test_monitoring_probe_slow_requests() {
        let components = components();
        for _ in 0..11 {
            components.performance.record_request(2500.0, false);
        }

        let health = aggregator(&components).check().await;
        let monitoring = find(&health, MONITORING_CHECK);
        assert_eq!(monitoring.status, HealthStatus::Warning);
        assert_eq!(monitoring.details.as_ref().unwrap()["slowRequests"], 11);
        assert_eq!(health.metrics.total_requests, 11);
    }

    #[tokio::test]
    async fn test_last_status_tracks_latest_check() {
        let components = components();
        let aggregator = aggregator(&components).with_data_store(healthy_data_store());
        assert_eq!(aggregator.last_status(), None);

        aggregator.check().await;
        assert_eq!(aggregator.last_status(), Some(HealthStatus::Warning));
    }

    #[test]
    fn test_overall_status_of_nothing_is_healthy() {
        assert_eq!(overall_status(&[]), HealthStatus::Healthy);
    }
}
