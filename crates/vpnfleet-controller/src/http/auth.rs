//! API-key middleware.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use vpnfleet_proto::{extract_api_key, key_matches, ErrorBody, AUTHORIZATION, X_API_KEY};

use crate::state::AppState;

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
