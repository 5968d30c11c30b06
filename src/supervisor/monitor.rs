//! Connection Health Monitor
//!
//! Periodically probes registered broker connections, classifies them,
//! attempts bounded auto-recovery of dropped sessions and notifies
//! subscribers whenever a target's classification changes.

use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::probe::{classify, HealthProbe};
use crate::broker::MonitoredConnection;
use crate::config::HealthConfig;
use crate::domain::{
    ConnectionHealth, ConnectionState, HealthCheckResult, HealthSummary, HealthTransition,
    SubCheck, TargetSummary,
};
use crate::error::{FlexmonError, Result};
use crate::services::Metrics;

/// Subscriber invoked with `(target_id, new_health)` on every transition
pub type HealthCallback = Arc<dyn Fn(&str, ConnectionHealth) + Send + Sync>;

/// Configuration for the health monitor
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between monitoring ticks (default: 60s)
    pub check_interval: Duration,
    /// Reconnect attempts before a dropped target is left alone (default: 3)
    pub max_recovery_attempts: u32,
    /// Account latency above which the target is flagged (default: 5s)
    pub slow_response: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from(&HealthConfig::default())
    }
}

impl From<&HealthConfig> for MonitorConfig {
    fn from(config: &HealthConfig) -> Self {
        Self {
            check_interval: Duration::from_secs(config.check_interval_secs),
            max_recovery_attempts: config.max_recovery_attempts,
            slow_response: Duration::from_millis(config.slow_response_ms),
        }
    }
}

/// Shortest accepted loop interval; zero is clamped up to this
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// One started monitoring loop
struct MonitorRun {
    cancel: CancellationToken,
    interval: Duration,
}

/// Health monitor for broker connections
pub struct HealthMonitor {
    config: MonitorConfig,
    probe: HealthProbe,
    targets: RwLock<BTreeMap<String, Arc<dyn MonitoredConnection>>>,
    results: DashMap<String, HealthCheckResult>,
    recovery_attempts: DashMap<String, u32>,
    callbacks: RwLock<Vec<HealthCallback>>,
    event_tx: broadcast::Sender<HealthTransition>,
    run: Mutex<Option<MonitorRun>>,
    metrics: Arc<Metrics>,
}

impl HealthMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            probe: HealthProbe::new(config.slow_response),
            config,
            targets: RwLock::new(BTreeMap::new()),
            results: DashMap::new(),
            recovery_attempts: DashMap::new(),
            callbacks: RwLock::new(Vec::new()),
            event_tx,
            run: Mutex::new(None),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(MonitorConfig::default())
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Register a target; replaces any connection already under `id`
    pub async fn register(&self, id: &str, connection: Arc<dyn MonitoredConnection>) {
        self.targets.write().await.insert(id.to_string(), connection);
        debug!("Registered health target: {}", id);
    }

    pub async fn target_ids(&self) -> Vec<String> {
        self.targets.read().await.keys().cloned().collect()
    }

    pub async fn add_callback(&self, callback: HealthCallback) {
        self.callbacks.write().await.push(callback);
    }

    /// Subscribe to transition events
    pub fn subscribe(&self) -> broadcast::Receiver<HealthTransition> {
        self.event_tx.subscribe()
    }

    /// Latest recorded result for one target
    pub fn target_health(&self, id: &str) -> Option<HealthCheckResult> {
        self.results.get(id).map(|r| r.clone())
    }

    /// Check one target (`Some`) or every target (`None`) now.
    ///
    /// Results are recorded and subscribers notified exactly as for a
    /// scheduled tick.
    pub async fn force_check(
        &self,
        target: Option<&str>,
    ) -> Result<BTreeMap<String, HealthCheckResult>> {
        match target {
            Some(id) => {
                let connection = self
                    .targets
                    .read()
                    .await
                    .get(id)
                    .cloned()
                    .ok_or_else(|| FlexmonError::NotFound(format!("health target {}", id)))?;

                let result = self.check_target(id, connection.as_ref()).await;
                self.record(result.clone()).await;
                Ok(BTreeMap::from([(id.to_string(), result)]))
            }
            None => Ok(self.check_all().await),
        }
    }

    /// Check every registered target sequentially and record the results
    pub async fn check_all(&self) -> BTreeMap<String, HealthCheckResult> {
        let targets: Vec<(String, Arc<dyn MonitoredConnection>)> = self
            .targets
            .read()
            .await
            .iter()
            .map(|(id, conn)| (id.clone(), Arc::clone(conn)))
            .collect();

        let mut results = BTreeMap::new();
        for (id, connection) in targets {
            let result = self.check_target(&id, connection.as_ref()).await;
            self.record(result.clone()).await;
            results.insert(id, result);
        }
        results
    }

    /// Evaluate one target without recording the result
    pub async fn check_target(
        &self,
        id: &str,
        connection: &dyn MonitoredConnection,
    ) -> HealthCheckResult {
        Metrics::inc(&self.metrics.health_checks);

        match connection.connection_state().await {
            Ok(ConnectionState::Connected) => {
                let details = self.probe.run(connection).await;
                let health = classify(&details);
                if health == ConnectionHealth::Healthy {
                    self.recovery_attempts.remove(id);
                }
                HealthCheckResult::new(id, health).with_details(details)
            }
            Ok(ConnectionState::Disconnected) => self.recover(id, connection).await,
            Ok(ConnectionState::Error(err)) => {
                HealthCheckResult::new(id, ConnectionHealth::Unhealthy)
                    .with_error(err.unwrap_or_else(|| "Connection error".to_string()))
            }
            Err(e) => {
                error!("Health check failed for {}: {}", id, e);
                HealthCheckResult::new(id, ConnectionHealth::Unknown).with_error(e.to_string())
            }
        }
    }

    async fn recover(&self, id: &str, connection: &dyn MonitoredConnection) -> HealthCheckResult {
        let max = self.config.max_recovery_attempts;

        // Reserve the attempt under the entry lock so concurrent checks cannot overshoot
        let attempt = {
            let mut attempts = self.recovery_attempts.entry(id.to_string()).or_insert(0);
            if *attempts < max {
                *attempts += 1;
                Some(*attempts)
            } else {
                None
            }
        };

        if let Some(attempt) = attempt {
            Metrics::inc(&self.metrics.recovery_attempts);
            info!("Attempting auto-recovery for {} (attempt {}/{})", id, attempt, max);

            match connection.reconnect().await {
                Ok(()) => {
                    self.recovery_attempts.remove(id);
                    info!("Auto-recovery successful for {}", id);
                    let mut result = HealthCheckResult::new(id, ConnectionHealth::Healthy);
                    result.recovery_successful = true;
                    result.recovery_attempts = Some(0);
                    return result;
                }
                Err(e) => warn!("Auto-recovery failed for {}: {}", id, e),
            }
        } else {
            warn!("Auto-recovery exhausted for {} ({} attempts)", id, max);
        }

        let attempts = self.recovery_attempts.get(id).map(|a| *a).unwrap_or(0);
        let recovery = SubCheck::failed("connection disconnected")
            .with_note("attempts", attempts)
            .with_note("max_attempts", max);

        let mut result = HealthCheckResult::new(id, ConnectionHealth::Unhealthy)
            .with_error("Connection disconnected")
            .with_details(BTreeMap::from([("recovery".to_string(), recovery)]));
        result.recovery_attempts = Some(attempts);
        result
    }

    async fn record(&self, result: HealthCheckResult) {
        let id = result.target_id.clone();
        let current = result.health;
        let previous = self.results.insert(id.clone(), result).map(|r| r.health);

        if previous.unwrap_or(ConnectionHealth::Unknown) == current {
            return;
        }

        Metrics::inc(&self.metrics.health_transitions);
        info!(
            "Health of {} changed: {} -> {}",
            id,
            previous.map(|h| h.to_string()).unwrap_or_else(|| "unknown".into()),
            current
        );

        let callbacks = self.callbacks.read().await.clone();
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&id, current))).is_err() {
                error!("Health callback panicked for {}", id);
            }
        }

        let _ = self.event_tx.send(HealthTransition {
            target_id: id,
            previous,
            current,
            at: Utc::now(),
        });
    }

    /// Aggregate view over the latest results
    pub fn summary(&self) -> HealthSummary {
        let targets: BTreeMap<String, TargetSummary> = self
            .results
            .iter()
            .map(|r| {
                (
                    r.key().clone(),
                    TargetSummary {
                        health: r.health,
                        last_check: r.checked_at,
                        error: r.error.clone(),
                    },
                )
            })
            .collect();

        let total = targets.len();
        let healthy = targets.values().filter(|t| t.health.is_healthy()).count();
        let last_check = targets.values().map(|t| t.last_check).max();

        let overall = if total == 0 {
            ConnectionHealth::Unknown
        } else if healthy == total {
            ConnectionHealth::Healthy
        } else if healthy as f64 >= total as f64 * 0.5 {
            ConnectionHealth::Degraded
        } else {
            ConnectionHealth::Unhealthy
        };

        HealthSummary {
            overall,
            recommendations: recommendations(&targets),
            targets,
            last_check,
            healthy_targets: healthy,
            total_targets: total,
        }
    }

    /// Start the periodic monitoring loop. Returns `None` if already running.
    ///
    /// Each run owns its stop signal, so a loop stopped before a restart
    /// never resumes alongside the new one.
    pub fn start_monitoring(self: &Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        let interval = if interval < MIN_CHECK_INTERVAL {
            warn!(
                "Health check interval {:?} too short, using {}s",
                interval,
                MIN_CHECK_INTERVAL.as_secs()
            );
            MIN_CHECK_INTERVAL
        } else {
            interval
        };

        let cancel = {
            let mut run = self.active_run();
            if let Some(active) = run.as_ref() {
                warn!(
                    "Health monitoring already running (interval {}s)",
                    active.interval.as_secs()
                );
                return None;
            }
            let cancel = CancellationToken::new();
            *run = Some(MonitorRun {
                cancel: cancel.clone(),
                interval,
            });
            cancel
        };
        info!("Health monitoring started (interval {}s)", interval.as_secs());

        let monitor = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let results = monitor.check_all().await;
                debug!("Health tick checked {} targets", results.len());
            }

            info!("Health monitoring stopped");
        }))
    }

    /// Stop the current loop; an in-progress round finishes first.
    /// Returns whether a loop was running.
    pub fn stop_monitoring(&self) -> bool {
        match self.active_run().take() {
            Some(run) => {
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.active_run().is_some()
    }

    /// Interval of the running loop, if any
    pub fn monitoring_interval(&self) -> Option<Duration> {
        self.active_run().as_ref().map(|run| run.interval)
    }

    fn active_run(&self) -> MutexGuard<'_, Option<MonitorRun>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn recommendations(targets: &BTreeMap<String, TargetSummary>) -> Vec<String> {
    if targets.is_empty() {
        return vec!["No health checks have run yet".to_string()];
    }

    let mut out = Vec::new();
    for (id, target) in targets {
        match target.health {
            ConnectionHealth::Unhealthy => out.push(format!(
                "{}: connection unhealthy, check gateway status and credentials",
                id
            )),
            ConnectionHealth::Degraded => out.push(format!(
                "{}: degraded, check market data subscriptions and response times",
                id
            )),
            ConnectionHealth::Unknown => {
                out.push(format!("{}: health unknown, run a forced check", id))
            }
            ConnectionHealth::Healthy => {}
        }
    }

    if out.is_empty() {
        out.push("All connections healthy".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::PaperBroker;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn monitor_with(broker: Arc<PaperBroker>) -> Arc<HealthMonitor> {
        let monitor = Arc::new(HealthMonitor::with_defaults());
        monitor.register("primary", broker).await;
        monitor
    }

    #[tokio::test]
    async fn test_summary_before_any_check_is_unknown() {
        let monitor = HealthMonitor::with_defaults();
        let summary = monitor.summary();
        assert_eq!(summary.overall, ConnectionHealth::Unknown);
        assert_eq!(summary.total_targets, 0);
        assert!(summary.last_check.is_none());
    }

    #[tokio::test]
    async fn test_healthy_connected_target() {
        let broker = Arc::new(PaperBroker::new("primary", "AAPL"));
        let monitor = monitor_with(broker).await;

        let results = monitor.force_check(Some("primary")).await.unwrap();
        let result = &results["primary"];
        assert_eq!(result.health, ConnectionHealth::Healthy);
        assert_eq!(result.details.len(), 3);
        assert_eq!(
            result.details["account_access"].notes.get("account_id").map(String::as_str),
            Some("PAPER-primary")
        );
        assert_eq!(monitor.summary().overall, ConnectionHealth::Healthy);
    }

    #[tokio::test]
    async fn test_poor_quote_degrades() {
        let broker = Arc::new(PaperBroker::new("primary", "AAPL"));
        broker.set_quote(0.0, 101.0).await;
        let monitor = monitor_with(broker).await;

        let result = &monitor.force_check(Some("primary")).await.unwrap()["primary"];
        assert_eq!(result.health, ConnectionHealth::Degraded);
        assert_eq!(
            result.details["market_data"].notes.get("data_quality").map(String::as_str),
            Some("poor")
        );
    }

    #[tokio::test]
    async fn test_recovery_budget_is_bounded() {
        let broker = Arc::new(PaperBroker::new("primary", "AAPL"));
        broker.set_state(ConnectionState::Disconnected).await;
        broker.set_reconnect_succeeds(false).await;
        let monitor = monitor_with(Arc::clone(&broker)).await;

        for _ in 0..5 {
            monitor.force_check(Some("primary")).await.unwrap();
        }

        assert_eq!(broker.reconnects().await, 3);
        let result = monitor.target_health("primary").unwrap();
        assert_eq!(result.health, ConnectionHealth::Unhealthy);
        assert_eq!(result.recovery_attempts, Some(3));
    }

    #[tokio::test]
    async fn test_successful_recovery_resets_counter() {
        let broker = Arc::new(PaperBroker::new("primary", "AAPL"));
        broker.set_state(ConnectionState::Disconnected).await;
        broker.set_reconnect_succeeds(false).await;
        let monitor = monitor_with(Arc::clone(&broker)).await;

        monitor.force_check(Some("primary")).await.unwrap();
        broker.set_reconnect_succeeds(true).await;

        let result = &monitor.force_check(Some("primary")).await.unwrap()["primary"];
        assert_eq!(result.health, ConnectionHealth::Healthy);
        assert!(result.recovery_successful);
        assert!(monitor.recovery_attempts.get("primary").is_none());
    }

    #[tokio::test]
    async fn test_error_state_is_unhealthy() {
        let broker = Arc::new(PaperBroker::new("primary", "AAPL"));
        broker
            .set_state(ConnectionState::Error(Some("gateway restarting".into())))
            .await;
        let monitor = monitor_with(broker).await;

        let result = &monitor.force_check(Some("primary")).await.unwrap()["primary"];
        assert_eq!(result.health, ConnectionHealth::Unhealthy);
        assert_eq!(result.error.as_deref(), Some("gateway restarting"));
    }

    #[tokio::test]
    async fn test_unknown_target_is_not_found() {
        let monitor = HealthMonitor::with_defaults();
        assert!(matches!(
            monitor.force_check(Some("nope")).await,
            Err(FlexmonError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_stop_others() {
        let broker = Arc::new(PaperBroker::new("primary", "AAPL"));
        let monitor = monitor_with(broker).await;
        let calls = Arc::new(AtomicUsize::new(0));

        monitor
            .add_callback(Arc::new(|_: &str, _: ConnectionHealth| panic!("subscriber bug")))
            .await;
        let counter = Arc::clone(&calls);
        monitor
            .add_callback(Arc::new(move |_: &str, _: ConnectionHealth| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .await;

        monitor.force_check(None).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_monitoring_twice_is_rejected() {
        let monitor = Arc::new(HealthMonitor::with_defaults());
        let handle = monitor.start_monitoring(Duration::from_secs(60));
        assert!(handle.is_some());
        assert!(monitor.start_monitoring(Duration::from_secs(60)).is_none());

        monitor.stop_monitoring();
        assert!(!monitor.is_monitoring());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_retires_previous_loop() {
        let broker = Arc::new(PaperBroker::new("primary", "AAPL"));
        let metrics = Arc::new(Metrics::new());
        let monitor = Arc::new(HealthMonitor::with_defaults().with_metrics(Arc::clone(&metrics)));
        monitor.register("primary", broker).await;

        let first = monitor.start_monitoring(Duration::from_secs(60)).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        monitor.stop_monitoring();
        let second = monitor.start_monitoring(Duration::from_secs(60)).unwrap();

        tokio::time::sleep(Duration::from_secs(5 * 60 - 30)).await;
        assert!(first.is_finished());
        assert!(!second.is_finished());

        // Immediate tick of each start, then four intervals of the second loop only
        let checks = metrics.health_checks.load(Ordering::Relaxed);
        assert_eq!(checks, 2 + 4);

        monitor.stop_monitoring();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(second.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped() {
        let monitor = Arc::new(HealthMonitor::with_defaults());
        let handle = monitor.start_monitoring(Duration::ZERO).unwrap();

        assert_eq!(monitor.monitoring_interval(), Some(MIN_CHECK_INTERVAL));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!handle.is_finished());

        monitor.stop_monitoring();
        assert_eq!(monitor.monitoring_interval(), None);
    }
}
