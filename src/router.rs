use std::sync::Arc;

use axum::{Router, routing::get};

use crate::{
    AppState,
    limiter::RateLimiter,
    middleware::{access_log, assign_request_id, rate_limit},
    routes,
};

// Requests flow: request id -> rate limit -> access log -> handler.
pub fn create_router(state: AppState, limiter: Arc<RateLimiter>) -> Router {
    let currency_routes = Router::new()
        .route("/currency/save", get(routes::currency::save_rates_without_date))
        .route("/currency/save/", get(routes::currency::save_rates_without_date))
        .route("/currency/save/{date}", get(routes::currency::save_rates))
        .route("/currency/{date}", get(routes::currency::get_rates))
        .route("/currency/{date}/{code}", get(routes::currency::get_rates_by_code))
        .fallback(routes::not_found);

    let router = currency_routes
        .layer(axum::middleware::from_fn(access_log))
        .layer(axum::middleware::from_fn_with_state(limiter, rate_limit))
        .layer(axum::middleware::from_fn(assign_request_id));

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    router.with_state(state)
}
