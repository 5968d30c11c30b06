use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use super::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::domain::{ConnectionHealth, HealthCheckResult};
use crate::error::FlexmonError;

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub target: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MonitoringQuery {
    /// Seconds between rounds; defaults to the configured interval
    pub check_interval: Option<u64>,
}

/// GET /health
pub async fn health_summary(State(state): State<AppState>) -> impl IntoResponse {
    let summary = state.monitor.summary();
    let status_code = match summary.overall {
        ConnectionHealth::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status_code, Json(summary))
}

/// GET /health/:target
pub async fn target_health(
    State(state): State<AppState>,
    Path(target): Path<String>,
) -> ApiResult<HealthCheckResult> {
    state
        .monitor
        .target_health(&target)
        .map(Json)
        .ok_or_else(|| ApiError(FlexmonError::NotFound(format!("no health result for {}", target))))
}

/// POST /health/check
pub async fn force_check(
    State(state): State<AppState>,
    Query(query): Query<CheckQuery>,
) -> ApiResult<BTreeMap<String, HealthCheckResult>> {
    let results = state.monitor.force_check(query.target.as_deref()).await?;
    Ok(Json(results))
}

/// POST /health/monitoring/start
pub async fn start_health_monitoring(
    State(state): State<AppState>,
    Query(query): Query<MonitoringQuery>,
) -> Json<Value> {
    let requested = query
        .check_interval
        .map(Duration::from_secs)
        .unwrap_or(state.monitor.config().check_interval);

    if state.monitor.start_monitoring(requested).is_none() {
        let current = state.monitor.monitoring_interval().unwrap_or(requested);
        return Json(json!({
            "message": "Health monitoring already running",
            "interval": current.as_secs(),
        }));
    }

    let interval = state
        .monitor
        .monitoring_interval()
        .unwrap_or(requested)
        .as_secs();

    Json(json!({
        "message": "Health monitoring started",
        "interval": interval,
        "targets": state.monitor.target_ids().await,
        "timestamp": Utc::now(),
    }))
}

/// POST /health/monitoring/stop
pub async fn stop_health_monitoring(State(state): State<AppState>) -> Json<Value> {
    let was_running = state.monitor.stop_monitoring();
    Json(json!({
        "message": "Health monitoring stopped",
        "was_running": was_running,
        "timestamp": Utc::now(),
    }))
}

/// Liveness probe
pub async fn liveness(State(state): State<AppState>) -> Json<Value> {
    let uptime = Utc::now() - state.start_time;
    Json(json!({
        "status": "ok",
        "started_at": state.start_time,
        "uptime_secs": uptime.num_seconds(),
    }))
}

/// Readiness probe: not ready while every checked target is unhealthy
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    match state.monitor.summary().overall {
        ConnectionHealth::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    }
}

/// Prometheus metrics endpoint
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let summary = state.monitor.summary();
    let body = state
        .metrics
        .prometheus(state.flex.registry().len(), summary.healthy_targets);

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
}
