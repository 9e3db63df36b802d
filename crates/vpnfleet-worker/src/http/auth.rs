//! Request guards: per-caller rate limit and API key.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use vpnfleet_proto::{extract_api_key, key_matches, ErrorBody, AUTHORIZATION, X_API_KEY};

use crate::ratelimit::RateDecision;
use crate::state::AppState;

/// Throttle callers by peer address.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match state.limiter.check(&peer).await {
        RateDecision::Allowed { .. } => next.run(request).await,
        RateDecision::Limited { retry_after } => {
            warn!(peer = %peer, path = %request.uri().path(), "Rate limit exceeded");
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, secs.max(1).to_string())],
                Json(ErrorBody::new("Rate limit exceeded")),
            )
                .into_response()
        }
    }
}

/// Reject requests that do not carry the configured key.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let headers = request.headers();
    let presented = extract_api_key(
        headers.get(X_API_KEY).and_then(|v| v.to_str().ok()),
        headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
    );

    if !key_matches(&state.api_key, presented) {
        warn!(path = %request.uri().path(), "Rejected request with invalid API key");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody::new("Invalid or missing API key")),
        )
            .into_response();
    }

    next.run(request).await
}
