use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Classification of one monitored connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionHealth {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl ConnectionHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ConnectionHealth::Healthy)
    }
}

impl fmt::Display for ConnectionHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionHealth::Healthy => write!(f, "healthy"),
            ConnectionHealth::Degraded => write!(f, "degraded"),
            ConnectionHealth::Unhealthy => write!(f, "unhealthy"),
            ConnectionHealth::Unknown => write!(f, "unknown"),
        }
    }
}

/// Transport-level state reported by a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "error")]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Error(Option<String>),
}

/// Outcome of one timed sub-check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubCheck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    /// Free-form observations (account id, symbol, position count, error text)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub notes: BTreeMap<String, String>,
    /// Succeeded but with degraded data or slow response
    #[serde(default)]
    pub quality_warning: bool,
}

impl SubCheck {
    pub fn passed(latency_ms: f64) -> Self {
        Self {
            success: true,
            latency_ms: Some(latency_ms),
            notes: BTreeMap::new(),
            quality_warning: false,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            latency_ms: None,
            notes: BTreeMap::from([("error".to_string(), error.into())]),
            quality_warning: false,
        }
    }

    pub fn with_note(mut self, key: &str, value: impl ToString) -> Self {
        self.notes.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_warning(mut self, warning: bool) -> Self {
        self.quality_warning = warning;
        self
    }
}

/// Latest health snapshot for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub target_id: String,
    pub health: ConnectionHealth,
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Sub-check name to outcome
    #[serde(default)]
    pub details: BTreeMap<String, SubCheck>,
    /// Failed recovery attempts counted so far, when recovery was involved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub recovery_successful: bool,
}

impl HealthCheckResult {
    pub fn new(target_id: impl Into<String>, health: ConnectionHealth) -> Self {
        Self {
            target_id: target_id.into(),
            health,
            checked_at: Utc::now(),
            error: None,
            details: BTreeMap::new(),
            recovery_attempts: None,
            recovery_successful: false,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_details(mut self, details: BTreeMap<String, SubCheck>) -> Self {
        self.details = details;
        self
    }
}

/// Emitted when a target's classification differs from its previous result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthTransition {
    pub target_id: String,
    pub previous: Option<ConnectionHealth>,
    pub current: ConnectionHealth,
    pub at: DateTime<Utc>,
}

/// Per-target entry of the aggregate view
#[derive(Debug, Clone, Serialize)]
pub struct TargetSummary {
    pub health: ConnectionHealth,
    pub last_check: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate health view across all targets
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub overall: ConnectionHealth,
    pub targets: BTreeMap<String, TargetSummary>,
    pub last_check: Option<DateTime<Utc>>,
    pub healthy_targets: usize,
    pub total_targets: usize,
    pub recommendations: Vec<String>,
}
