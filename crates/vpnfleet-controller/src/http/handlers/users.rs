//! User handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use vpnfleet_proto::{ApiResponse, PROFILE_CONTENT_TYPE};

use super::error_response;
use crate::http::responses::{
    CreateUserBody, DeleteUserResponse, PlacementResponse, RecommendationResponse, UserResponse,
};
use crate::service::NewUser;
use crate::state::AppState;

/// Node that served a downloaded profile.
pub const SERVED_BY_HEADER: HeaderName = HeaderName::from_static("x-vpnfleet-node");

/// Create a user on the best available node.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateUserBody>,
) -> Response {
    let new = NewUser {
        username: body.username,
        port: body.port,
        protocol: body.protocol,
        preferred_node: body.server_id.filter(|s| !s.is_empty()),
        created_by: body.created_by.unwrap_or_else(|| "management".to_string()),
    };

    match state.service.create_user(new).await {
        Ok(placement) => (
            StatusCode::CREATED,
            Json(ApiResponse::ok(
                format!("User {} created", placement.user.username),
                PlacementResponse {
                    user: UserResponse::from(&placement.user),
                    server: RecommendationResponse::from(&placement.node),
                    recommendations: placement
                        .recommendations
                        .iter()
                        .map(RecommendationResponse::from)
                        .collect(),
                },
            )),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// Delete a user fleet-wide.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Response {
    match state.service.delete_user(&username).await {
        Ok(report) => Json(ApiResponse::ok(
            format!("User {} deleted", username),
            DeleteUserResponse {
                username,
                removed_from: report.removed_from.iter().map(|n| n.to_string()).collect(),
                failed: report.failed.iter().map(|n| n.to_string()).collect(),
            },
        ))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// Download a user's profile from the best node.
pub async fn download_profile(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Response {
    match state.service.resolve_profile(&username).await {
        Ok(resolved) => (
            [
                (header::CONTENT_TYPE, PROFILE_CONTENT_TYPE.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}.ovpn\"", username),
                ),
                (SERVED_BY_HEADER, resolved.node.id.to_string()),
            ],
            resolved.profile,
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}
