use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::{ApiError, ApiResult};
use crate::analytics::PerformanceMetrics;
use crate::api::state::AppState;
use crate::domain::{JobHandle, JobStatus, Record, RecordSet, ReportKind};
use crate::error::FlexmonError;

/// Default look-back window for `/flex/metrics` without explicit dates
const DEFAULT_METRICS_WINDOW_DAYS: i64 = 90;

#[derive(Debug, Deserialize)]
pub struct DataQuery {
    #[serde(default)]
    pub wait: bool,
    /// Seconds; defaults to the configured maximum wait
    pub max_wait: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct MetricsRequest {
    pub records: Vec<Record>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// POST /flex/execute/:kind
pub async fn execute_report(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> std::result::Result<Response, ApiError> {
    let kind: ReportKind = kind.parse().map_err(FlexmonError::Configuration)?;
    let handle = state.flex.execute_kind(kind).await?;

    let status = match handle.status {
        JobStatus::Failed => StatusCode::BAD_GATEWAY,
        _ => StatusCode::OK,
    };
    Ok((status, Json(handle)).into_response())
}

/// GET /flex/status/:reference
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> ApiResult<JobHandle> {
    state
        .flex
        .get_status(&reference)
        .map(Json)
        .ok_or_else(|| ApiError(FlexmonError::NotFound(format!("report {}", reference))))
}

/// GET /flex/jobs
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobHandle>> {
    Json(state.flex.registry().list())
}

/// GET /flex/config
///
/// Reports which query ids are set up without revealing the token.
pub async fn flex_config(State(state): State<AppState>) -> Json<Value> {
    let queries: Map<String, Value> = ReportKind::ALL
        .iter()
        .map(|kind| {
            let query_id = state.flex.queries().query_id(*kind);
            let entry = json!({
                "query_id": query_id,
                "configured": query_id.is_some(),
            });
            (kind.as_str().to_string(), entry)
        })
        .collect();

    Json(json!({
        "token_configured": state.flex.token_configured(),
        "queries": queries,
    }))
}

/// GET /flex/data/:reference
pub async fn get_report_data(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    Query(query): Query<DataQuery>,
) -> ApiResult<RecordSet> {
    let max_wait = query.max_wait.map(Duration::from_secs);
    let records = state
        .flex
        .get_data(&reference, query.wait, max_wait)
        .await?;
    Ok(Json(records))
}

/// POST /flex/metrics
pub async fn compute_metrics(
    State(state): State<AppState>,
    Json(request): Json<MetricsRequest>,
) -> ApiResult<PerformanceMetrics> {
    let end = request.end_date.unwrap_or_else(Utc::now);
    let start = request
        .start_date
        .unwrap_or(end - ChronoDuration::days(DEFAULT_METRICS_WINDOW_DAYS));

    if start > end {
        return Err(ApiError(FlexmonError::Configuration(
            "start_date must not be after end_date".into(),
        )));
    }

    Ok(Json(state.flex.compute_metrics(&request.records, start, end)))
}
