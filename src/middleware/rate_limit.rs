use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use tokio::time::Instant;

use crate::error::AppError;
use crate::limiter::{Admission, RateLimiter};

/// Identity used when neither proxy headers nor the socket tell us who called.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolves the caller's address: first `X-Forwarded-For` entry, then
/// `X-Real-IP`, then the socket peer.
pub fn client_ip<B>(req: &Request<B>) -> String {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').map(str::trim).find(|ip| !ip.is_empty()));

    let real_ip = || {
        req.headers()
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    };

    let remote_ip = || {
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string())
    };

    forwarded
        .or_else(real_ip)
        .map(str::to_owned)
        .or_else(remote_ip)
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_owned())
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if !limiter.is_enabled() {
        return Ok(next.run(req).await);
    }

    let ip = client_ip(&req);
    match limiter.admit(&ip, Instant::now()) {
        Admission::Allowed => Ok(next.run(req).await),
        Admission::Denied => {
            tracing::warn!(ip = %ip, path = %req.uri().path(), "Rate limit exceeded");
            Err(AppError::Throttled)
        }
    }
}
