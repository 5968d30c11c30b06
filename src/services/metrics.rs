use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters for observability
pub struct Metrics {
    /// Jobs accepted by the remote
    pub jobs_submitted: AtomicU64,
    /// Submissions refused by the remote or lost in transport
    pub jobs_rejected: AtomicU64,
    /// Statements fetched and parsed
    pub jobs_completed: AtomicU64,
    /// Jobs that ended Failed (fatal error or timeout)
    pub jobs_failed: AtomicU64,
    /// `GetStatement` calls made
    pub statement_fetches: AtomicU64,
    /// Not-ready poll responses
    pub not_ready_polls: AtomicU64,
    /// "Still waiting" progress lines logged by waiters
    pub progress_reports: AtomicU64,
    /// Transport failures that were retried
    pub transport_retries: AtomicU64,
    /// Health evaluations of a single target
    pub health_checks: AtomicU64,
    /// Classification changes
    pub health_transitions: AtomicU64,
    /// Reconnect attempts
    pub recovery_attempts: AtomicU64,
    started_at: i64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            jobs_submitted: AtomicU64::new(0),
            jobs_rejected: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            statement_fetches: AtomicU64::new(0),
            not_ready_polls: AtomicU64::new(0),
            progress_reports: AtomicU64::new(0),
            transport_retries: AtomicU64::new(0),
            health_checks: AtomicU64::new(0),
            health_transitions: AtomicU64::new(0),
            recovery_attempts: AtomicU64::new(0),
            started_at: Utc::now().timestamp(),
        }
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> i64 {
        Utc::now().timestamp() - self.started_at
    }

    /// Export metrics in Prometheus format
    pub fn prometheus(&self, tracked_jobs: usize, healthy_targets: usize) -> String {
        let counters: [(&str, &str, &AtomicU64); 11] = [
            ("jobs_submitted_total", "Report jobs accepted by the remote", &self.jobs_submitted),
            ("jobs_rejected_total", "Report submissions refused", &self.jobs_rejected),
            ("jobs_completed_total", "Statements fetched and parsed", &self.jobs_completed),
            ("jobs_failed_total", "Report jobs that ended failed", &self.jobs_failed),
            ("statement_fetches_total", "GetStatement calls made", &self.statement_fetches),
            ("not_ready_polls_total", "Not-ready poll responses", &self.not_ready_polls),
            ("progress_reports_total", "Waiter progress lines logged", &self.progress_reports),
            ("transport_retries_total", "Retried transport failures", &self.transport_retries),
            ("health_checks_total", "Single-target health evaluations", &self.health_checks),
            ("health_transitions_total", "Health classification changes", &self.health_transitions),
            ("recovery_attempts_total", "Connection recovery attempts", &self.recovery_attempts),
        ];

        let mut out = String::new();
        for (name, help, counter) in counters {
            out.push_str(&format!(
                "# HELP flexmon_{name} {help}\n# TYPE flexmon_{name} counter\nflexmon_{name} {}\n\n",
                counter.load(Ordering::Relaxed)
            ));
        }

        out.push_str(&format!(
            r#"# HELP flexmon_tracked_jobs Report jobs held in the registry
# TYPE flexmon_tracked_jobs gauge
flexmon_tracked_jobs {}

# HELP flexmon_healthy_targets Monitored targets currently healthy
# TYPE flexmon_healthy_targets gauge
flexmon_healthy_targets {}

# HELP flexmon_uptime_seconds Process uptime
# TYPE flexmon_uptime_seconds gauge
flexmon_uptime_seconds {}
"#,
            tracked_jobs,
            healthy_targets,
            self.uptime_secs()
        ));
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
