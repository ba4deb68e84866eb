use axum::{Json, http::StatusCode, response::IntoResponse};

pub mod currency;

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "not found" })),
    )
}
