use axum::{
    Json,
    extract::{Extension, Path, State},
};

use super::model::{DATE_REQUIRED, RatesResponse, SaveResponse, parse_code, parse_date};
use crate::{
    AppState,
    error::AppError,
    middleware::RequestId,
    worker::{SaveJob, SubmitError},
};

/// Queues a fetch of the feed for `date` and acknowledges right away.
#[axum::debug_handler]
pub async fn save_rates(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Path(date): Path<String>,
) -> Result<Json<SaveResponse>, AppError> {
    let date = parse_date(&date)?;

    state
        .queue
        .submit(SaveJob { date, request_id })
        .map_err(|e| {
            tracing::warn!("Refused to queue save for {}: {}", date, e);
            let message = match e {
                SubmitError::Full => "too many pending saves, try again later",
                SubmitError::Closed => "service is shutting down",
            };
            AppError::Unavailable(message.to_string())
        })?;

    tracing::info!("Accepted save request for {}", date);
    Ok(Json(SaveResponse { success: true }))
}

pub async fn save_rates_without_date() -> AppError {
    AppError::BadRequest(DATE_REQUIRED.to_string())
}

#[axum::debug_handler]
pub async fn get_rates(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<RatesResponse>, AppError> {
    let date = parse_date(&date)?;
    let rates = state.service.rates_by_date(date).await?;
    Ok(Json(RatesResponse { rates }))
}

#[axum::debug_handler]
pub async fn get_rates_by_code(
    State(state): State<AppState>,
    Path((date, code)): Path<(String, String)>,
) -> Result<Json<RatesResponse>, AppError> {
    let date = parse_date(&date)?;
    let code = parse_code(&code)?;
    let rates = state.service.rates_by_date_and_code(date, code).await?;
    Ok(Json(RatesResponse { rates }))
}
