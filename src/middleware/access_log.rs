use axum::{
    body::{Body, to_bytes},
    http::Request,
    middleware::Next,
    response::Response,
};
use tokio::time::Instant;
use tracing::{error, info};

use super::rate_limit::client_ip;

const MAX_LOGGED_BODY: usize = 64 * 1024;

/// Logs every handled request once the final status is known. Server errors
/// are logged a second time together with their body.
pub async fn access_log(req: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let ip = client_ip(&req);

    let response = next.run(req).await;
    let status = response.status();

    info!(
        method = %method,
        path = %path,
        ip = %ip,
        status_code = status.as_u16(),
        duration = ?started.elapsed(),
        "Request completed"
    );

    if !status.is_server_error() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_LOGGED_BODY).await {
        Ok(b) => b,
        Err(e) => {
            error!("Failed to read error response body: {}", e);
            return Response::from_parts(parts, Body::empty());
        }
    };

    error!(
        "Server error occurred - Status: {}, Body: {}",
        parts.status,
        String::from_utf8_lossy(&bytes)
    );

    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(bytes))
}
