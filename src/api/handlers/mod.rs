pub mod flex;
pub mod health;

pub use flex::*;
pub use health::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::FlexmonError;

/// Handler error carrying the domain error; rendered as JSON
#[derive(Debug)]
pub struct ApiError(pub FlexmonError);

impl From<FlexmonError> for ApiError {
    fn from(err: FlexmonError) -> Self {
        Self(err)
    }
}

pub type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// HTTP status for a domain error
pub fn status_for(err: &FlexmonError) -> StatusCode {
    match err {
        FlexmonError::NotReady { .. } => StatusCode::ACCEPTED,
        FlexmonError::NotFound(_) => StatusCode::NOT_FOUND,
        FlexmonError::Config(_) | FlexmonError::Configuration(_) => StatusCode::BAD_REQUEST,
        FlexmonError::DuplicateSubmission(_) => StatusCode::CONFLICT,
        FlexmonError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        FlexmonError::RemoteFatal { .. }
        | FlexmonError::RetryableTransport { .. }
        | FlexmonError::Document(_)
        | FlexmonError::Http(_) => StatusCode::BAD_GATEWAY,
        FlexmonError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = match &self.0 {
            FlexmonError::NotReady { reference } => json!({
                "status": "processing",
                "reference": reference,
                "message": self.0.to_string(),
            }),
            err => json!({
                "error": err.to_string(),
                "reference": err.reference(),
                "retryable": err.is_retryable(),
            }),
        };
        (status, Json(body)).into_response()
    }
}
