use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a submitted report job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Report families that have a configured query id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Trades,
    Positions,
    Cash,
}

impl ReportKind {
    pub const ALL: [ReportKind; 3] = [ReportKind::Trades, ReportKind::Positions, ReportKind::Cash];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Trades => "trades",
            ReportKind::Positions => "positions",
            ReportKind::Cash => "cash",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trades" => Ok(ReportKind::Trades),
            "positions" => Ok(ReportKind::Positions),
            "cash" | "cash_transactions" => Ok(ReportKind::Cash),
            other => Err(format!(
                "invalid report kind '{}', must be one of: trades, positions, cash",
                other
            )),
        }
    }
}

/// Parameters for one report generation request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSpec {
    /// Remote query id
    pub query_id: String,
    /// Web service token; falls back to the configured token when absent
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    /// Replaying a known key returns the first handle instead of resubmitting
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl JobSpec {
    pub fn new(query_id: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
            token: None,
            idempotency_key: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// One submitted report job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Caller-supplied logical id
    pub job_id: String,
    /// Remote-assigned reference code; absent when submission failed
    pub reference: Option<String>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobHandle {
    /// Handle for a job the remote accepted
    pub fn running(job_id: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            reference: Some(reference.into()),
            status: JobStatus::Running,
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }

    /// Handle for a job the remote refused or never saw
    pub fn failed(job_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            reference: None,
            status: JobStatus::Failed,
            created_at: Utc::now(),
            completed_at: None,
            error_message: Some(error.into()),
        }
    }

    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.error_message = None;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error_message = Some(error.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_kind_parse() {
        assert_eq!("Trades".parse::<ReportKind>(), Ok(ReportKind::Trades));
        assert_eq!("cash_transactions".parse::<ReportKind>(), Ok(ReportKind::Cash));
        assert!("orders".parse::<ReportKind>().is_err());
    }

    #[test]
    fn test_failed_handle_has_no_reference() {
        let handle = JobHandle::failed("123456", "Error 1020: Invalid request");
        assert_eq!(handle.status, JobStatus::Failed);
        assert!(handle.reference.is_none());
        assert!(handle.status.is_terminal());
    }

    #[test]
    fn test_token_is_never_serialized() {
        let spec = JobSpec::new("123456").with_token("secret-token");
        let json = serde_json::to_string(&spec).unwrap();
        assert!(!json.contains("secret-token"));
    }
}
