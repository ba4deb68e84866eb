use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::service::ServiceError;

/// Failures surfaced to HTTP callers. Internal details stay in the logs.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Internal,
    Throttled,
    Unavailable(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    success: Option<bool>,
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, success, error) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, Some(false), message),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
                "internal error".to_string(),
            ),
            AppError::Throttled => (
                StatusCode::TOO_MANY_REQUESTS,
                None,
                "rate limited exceeded".to_string(),
            ),
            AppError::Unavailable(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, Some(false), message)
            }
        };

        (status, Json(ErrorResponse { success, error })).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(_: ServiceError) -> Self {
        AppError::Internal
    }
}
