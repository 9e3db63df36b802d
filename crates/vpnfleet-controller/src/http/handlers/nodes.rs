//! Node registry handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use vpnfleet_proto::{ApiResponse, HeartbeatRequest, RegisterRequest};

use super::error_response;
use crate::http::responses::NodeResponse;
use crate::state::AppState;

/// Worker registration.
///
/// Answers once the node is recorded; the user backfill continues in the
/// background.
pub async fn register_node(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Response {
    match state.service.register_node(req).await {
        Ok(registration) => (
            StatusCode::OK,
            Json(ApiResponse::ok(
                format!("End-node {} registered", registration.node.id),
                NodeResponse::new(&registration.node, 0),
            )),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// Worker heartbeat. Unauthenticated.
pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Path(server_id): Path<String>,
    Json(req): Json<HeartbeatRequest>,
) -> Response {
    match state.service.heartbeat(&server_id, req).await {
        Ok(()) => Json(ApiResponse::message("Heartbeat received")).into_response(),
        Err(e) => error_response(e),
    }
}

/// Best-effort deregistration sent by a worker on shutdown.
pub async fn deregister_node(
    State(state): State<Arc<AppState>>,
    Path(server_id): Path<String>,
) -> Response {
    match state.service.deregister_node(&server_id).await {
        Ok(()) => Json(ApiResponse::message(format!(
            "End-node {} deregistered",
            server_id
        )))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// List nodes as JSON.
pub async fn list_nodes(State(state): State<Arc<AppState>>) -> Response {
    match state.service.list_nodes().await {
        Ok(nodes) => {
            let body: Vec<NodeResponse> = nodes
                .iter()
                .map(|(node, users)| NodeResponse::new(node, *users))
                .collect();
            Json(body).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Remove a node record.
pub async fn remove_node(
    State(state): State<Arc<AppState>>,
    Path(server_id): Path<String>,
) -> Response {
    match state.service.remove_node(&server_id).await {
        Ok(node) => {
            info!(node = %node.id, "End-node removed by operator");
            Json(ApiResponse::message(format!("End-node {} removed", node.id))).into_response()
        }
        Err(e) => error_response(e),
    }
}
