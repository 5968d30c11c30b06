//! Report job lifecycle: submission, registry and completion waiting.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::PollSchedule;
use super::envelope::{parse_submit_response, FetchOutcome, ResponseClassifier, SubmitOutcome};
use super::registry::{IdempotencyResult, JobRegistry};
use super::transport::StatementTransport;
use crate::analytics::{self, PerformanceMetrics};
use crate::config::{AppConfig, QueryMappings};
use crate::domain::{JobHandle, JobSpec, Record, RecordSet, ReportKind};
use crate::error::{FlexmonError, Result};
use crate::services::Metrics;

/// Submits report jobs and waits for their statements
pub struct FlexQueryService {
    transport: Arc<dyn StatementTransport>,
    registry: Arc<JobRegistry>,
    classifier: ResponseClassifier,
    schedule: PollSchedule,
    default_token: Option<String>,
    default_max_wait: Duration,
    queries: QueryMappings,
    metrics: Arc<Metrics>,
}

impl FlexQueryService {
    pub fn new(transport: Arc<dyn StatementTransport>, config: &AppConfig) -> Self {
        Self {
            transport,
            registry: Arc::new(JobRegistry::new()),
            classifier: ResponseClassifier::new(&config.polling.not_ready_phrases),
            schedule: PollSchedule::from(&config.polling),
            default_token: config
                .flex
                .token
                .clone()
                .filter(|t| !t.trim().is_empty()),
            default_max_wait: Duration::from_secs(config.polling.max_wait_secs),
            queries: config.flex.queries.clone(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn default_max_wait(&self) -> Duration {
        self.default_max_wait
    }

    /// Whether a default token is available for submissions
    pub fn token_configured(&self) -> bool {
        self.default_token.is_some()
    }

    pub fn queries(&self) -> &QueryMappings {
        &self.queries
    }

    /// Submit a report job under the caller's logical `job_id`.
    ///
    /// Configuration problems are errors. A remote refusal or transport
    /// failure is returned as a `Failed` handle that is not registered.
    pub async fn submit(&self, job_id: &str, spec: &JobSpec) -> Result<JobHandle> {
        let query_id = spec.query_id.trim();
        if query_id.is_empty() {
            return Err(FlexmonError::Configuration("query id is required".into()));
        }
        let token = spec
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.default_token.clone())
            .ok_or_else(|| FlexmonError::Configuration("Flex token not configured".into()))?;

        let key = spec.idempotency_key.as_deref().filter(|k| !k.is_empty());
        if let Some(key) = key {
            match self.registry.claim_key(key) {
                IdempotencyResult::New => {}
                IdempotencyResult::Duplicate(handle) => return Ok(handle),
                IdempotencyResult::InFlight => {
                    return Err(FlexmonError::DuplicateSubmission(key.to_string()))
                }
            }
        }

        let handle = self.send(job_id, query_id, &token).await;

        if let Some(key) = key {
            match &handle.reference {
                Some(reference) => self.registry.complete_key(key, reference),
                None => self.registry.release_key(key),
            }
        }
        Ok(handle)
    }

    async fn send(&self, job_id: &str, query_id: &str, token: &str) -> JobHandle {
        info!("Submitting report job {} (query {})", job_id, query_id);

        let outcome = match self.transport.send_request(query_id, token).await {
            Ok(response) => parse_submit_response(&response),
            Err(e) => SubmitOutcome::Rejected {
                message: e.to_string(),
            },
        };

        match outcome {
            SubmitOutcome::Accepted { reference } => {
                let handle = JobHandle::running(job_id, &reference);
                if let Err(e) = self.registry.register(handle.clone(), Some(token.to_string())) {
                    error!("Failed to register job {}: {}", job_id, e);
                    Metrics::inc(&self.metrics.jobs_rejected);
                    return JobHandle::failed(job_id, e.to_string());
                }
                Metrics::inc(&self.metrics.jobs_submitted);
                info!("Report job {} accepted with reference {}", job_id, reference);
                handle
            }
            SubmitOutcome::Rejected { message } => {
                Metrics::inc(&self.metrics.jobs_rejected);
                error!("Report job {} rejected: {}", job_id, message);
                JobHandle::failed(job_id, message)
            }
        }
    }

    /// Submit with `job_id` equal to the query id
    pub async fn execute(&self, spec: &JobSpec) -> Result<JobHandle> {
        let job_id = spec.query_id.clone();
        self.submit(&job_id, spec).await
    }

    /// Submit the configured query for a report family
    pub async fn execute_kind(&self, kind: ReportKind) -> Result<JobHandle> {
        let query_id = self.queries.query_id(kind).ok_or_else(|| {
            FlexmonError::Configuration(format!("no query id configured for {} reports", kind))
        })?;
        self.submit(kind.as_str(), &JobSpec::new(query_id)).await
    }

    pub fn get_status(&self, reference: &str) -> Option<JobHandle> {
        self.registry.get(reference)
    }

    /// Fetch the statement for `reference`.
    ///
    /// With `wait` the call blocks like [`wait`](Self::wait); without it a
    /// single fetch is made and a statement still being generated surfaces
    /// as [`FlexmonError::NotReady`].
    pub async fn get_data(
        &self,
        reference: &str,
        wait: bool,
        max_wait: Option<Duration>,
    ) -> Result<RecordSet> {
        if wait {
            return self
                .wait(reference, max_wait.unwrap_or(self.default_max_wait))
                .await;
        }

        let token = self.resolve_token(reference)?;
        let mut failures = 0u32;
        loop {
            match self.fetch(reference, &token).await {
                FetchOutcome::Ready(records) => return Ok(self.complete(reference, records)),
                FetchOutcome::NotReady(_) => {
                    return Err(FlexmonError::NotReady {
                        reference: reference.to_string(),
                    })
                }
                FetchOutcome::Fatal(message) => return Err(self.fail(reference, message)),
                FetchOutcome::Retryable(message) => {
                    failures += 1;
                    if failures > self.schedule.max_transport_retries {
                        return Err(self.exhaust(reference, failures, message));
                    }
                    Metrics::inc(&self.metrics.transport_retries);
                    warn!(
                        "Transport failure fetching {}: {} (retry {})",
                        reference, message, failures
                    );
                    tokio::time::sleep(self.schedule.transport_delay(failures)).await;
                }
            }
        }
    }

    /// Poll until the statement is ready, a fatal error occurs, or
    /// `max_wait` elapses.
    pub async fn wait(&self, reference: &str, max_wait: Duration) -> Result<RecordSet> {
        self.wait_with_cancel(reference, max_wait, &CancellationToken::new())
            .await
    }

    /// [`wait`](Self::wait) that also stops when `cancel` fires.
    ///
    /// Cancellation leaves the job `Running` so a later wait can resume it.
    pub async fn wait_with_cancel(
        &self,
        reference: &str,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<RecordSet> {
        let token = self.resolve_token(reference)?;
        let started = Instant::now();
        let mut last_progress = started;
        let mut not_ready_polls = 0u32;
        let mut transport_failures = 0u32;

        info!("Waiting for report {} (max {}s)", reference, max_wait.as_secs());

        loop {
            let remaining = max_wait.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(self.time_out(reference, started));
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(reference)),
                fetched = tokio::time::timeout(remaining, self.fetch(reference, &token)) => {
                    match fetched {
                        Ok(outcome) => outcome,
                        Err(_) => return Err(self.time_out(reference, started)),
                    }
                }
            };

            let delay = match outcome {
                FetchOutcome::Ready(records) => return Ok(self.complete(reference, records)),
                FetchOutcome::Fatal(message) => return Err(self.fail(reference, message)),
                FetchOutcome::NotReady(message) => {
                    transport_failures = 0;
                    let delay = self.schedule.not_ready_delay(not_ready_polls);
                    not_ready_polls += 1;
                    Metrics::inc(&self.metrics.not_ready_polls);

                    if last_progress.elapsed() >= self.schedule.progress_interval {
                        info!(
                            "Still waiting for report {} ({}s elapsed, {} polls)",
                            reference,
                            started.elapsed().as_secs(),
                            not_ready_polls
                        );
                        last_progress = Instant::now();
                        Metrics::inc(&self.metrics.progress_reports);
                    } else {
                        debug!("Report {} not ready: {}", reference, message);
                    }
                    delay
                }
                FetchOutcome::Retryable(message) => {
                    transport_failures += 1;
                    if transport_failures > self.schedule.max_transport_retries {
                        return Err(self.exhaust(reference, transport_failures, message));
                    }
                    Metrics::inc(&self.metrics.transport_retries);
                    warn!(
                        "Transport failure waiting for {}: {} (retry {}/{})",
                        reference, message, transport_failures, self.schedule.max_transport_retries
                    );
                    self.schedule.transport_delay(transport_failures)
                }
            };

            let remaining = max_wait.saturating_sub(started.elapsed());
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(reference)),
                _ = tokio::time::sleep(delay.min(remaining)) => {}
            }
        }
    }

    /// Performance metrics over parsed records
    pub fn compute_metrics(
        &self,
        records: &[Record],
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> PerformanceMetrics {
        analytics::compute_metrics(records, period_start, period_end)
    }

    fn resolve_token(&self, reference: &str) -> Result<String> {
        self.registry
            .token(reference)
            .or_else(|| self.default_token.clone())
            .ok_or_else(|| FlexmonError::Configuration("Flex token not configured".into()))
    }

    async fn fetch(&self, reference: &str, token: &str) -> FetchOutcome {
        Metrics::inc(&self.metrics.statement_fetches);
        let result = self.transport.get_statement(reference, token).await;
        self.classifier.classify(reference, result)
    }

    fn complete(&self, reference: &str, records: RecordSet) -> RecordSet {
        self.registry.mark_completed(reference);
        Metrics::inc(&self.metrics.jobs_completed);
        info!(
            "Report {} ready: {} {} records",
            reference, records.total_records, records.data_type
        );
        records
    }

    fn fail(&self, reference: &str, message: String) -> FlexmonError {
        self.registry.mark_failed(reference, &message);
        Metrics::inc(&self.metrics.jobs_failed);
        error!("Report {} failed: {}", reference, message);
        FlexmonError::RemoteFatal { message }
    }

    fn exhaust(&self, reference: &str, attempts: u32, message: String) -> FlexmonError {
        let err = FlexmonError::RetryableTransport {
            reference: reference.to_string(),
            attempts,
            message,
        };
        self.registry.mark_failed(reference, &err.to_string());
        Metrics::inc(&self.metrics.jobs_failed);
        error!("Giving up on {}: {}", reference, err);
        err
    }

    fn time_out(&self, reference: &str, started: Instant) -> FlexmonError {
        let err = FlexmonError::Timeout {
            reference: reference.to_string(),
            elapsed_secs: started.elapsed().as_secs(),
        };
        self.registry.mark_failed(reference, &err.to_string());
        Metrics::inc(&self.metrics.jobs_failed);
        warn!("{}", err);
        err
    }
}

fn cancelled(reference: &str) -> FlexmonError {
    info!("Wait for report {} cancelled", reference);
    FlexmonError::Cancelled {
        reference: reference.to_string(),
    }
}
