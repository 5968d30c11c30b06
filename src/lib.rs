pub mod adapters;
pub mod analytics;
pub mod api;
pub mod broker;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod flex;
pub mod services;
pub mod supervisor;

pub use analytics::{compute_metrics, PerformanceMetrics};
pub use config::AppConfig;
pub use domain::{
    ConnectionHealth, HealthCheckResult, HealthSummary, JobHandle, JobSpec, JobStatus, Record,
    RecordSet, ReportKind,
};
pub use error::{FlexmonError, Result};
pub use flex::{FlexQueryService, JobRegistry, StatementTransport};
pub use supervisor::{HealthMonitor, MonitorConfig};
