//! Health and metrics handlers.

use std::sync::Arc;

use axum::{extract::State, http::header, response::IntoResponse, Json};

use vpnfleet_proto::HealthResponse;

use crate::state::AppState;

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse::healthy(
        state.server_id.clone(),
        env!("CARGO_PKG_VERSION"),
    ))
}

/// Prometheus metrics endpoint.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = crate::metrics::collect_metrics(state.service.store().as_ref()).await;
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
