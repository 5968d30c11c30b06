use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::flex::FlexQueryService;
use crate::services::Metrics;
use crate::supervisor::HealthMonitor;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    /// Report job service
    pub flex: Arc<FlexQueryService>,

    /// Connection health monitor
    pub monitor: Arc<HealthMonitor>,

    /// Operational counters
    pub metrics: Arc<Metrics>,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        flex: Arc<FlexQueryService>,
        monitor: Arc<HealthMonitor>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            flex,
            monitor,
            metrics,
            start_time: Utc::now(),
        }
    }
}
