use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_summary))
        .route("/health/check", post(handlers::force_check))
        .route("/health/monitoring/start", post(handlers::start_health_monitoring))
        .route("/health/monitoring/stop", post(handlers::stop_health_monitoring))
        .route("/health/:target", get(handlers::target_health))
        .route("/healthz", get(handlers::liveness))
        .route("/readyz", get(handlers::readiness))
        .route("/metrics", get(handlers::prometheus_metrics))
        // Report endpoints
        .route("/flex/execute/:kind", post(handlers::execute_report))
        .route("/flex/status/:reference", get(handlers::get_job_status))
        .route("/flex/data/:reference", get(handlers::get_report_data))
        .route("/flex/jobs", get(handlers::list_jobs))
        .route("/flex/config", get(handlers::flex_config))
        .route("/flex/metrics", post(handlers::compute_metrics))
        .with_state(state)
        .layer(cors)
}
