//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use vpnfleet_core::{CoreError, Username};
use vpnfleet_proto::{
    ApiResponse, CreateProfileRequest, CreateProfileResult, ErrorBody, HealthResponse,
    PROFILE_CONTENT_TYPE,
};

use crate::revoke::RevokeError;
use crate::state::AppState;

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody::new(message))).into_response()
}

fn bad_request(e: CoreError) -> Response {
    json_error(StatusCode::BAD_REQUEST, e.to_string())
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse::healthy(
        state.server_id.clone(),
        env!("CARGO_PKG_VERSION"),
    ))
}

/// Issue a certificate and write the user's profile.
pub async fn create_profile(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateProfileRequest>,
) -> Response {
    let (params, fallback) = match body.validate() {
        Ok(parts) => parts,
        Err(e) => return bad_request(e),
    };

    let _guard = state.locks.lock(params.username.as_str()).await;
    match state.provision.provision(&params, &fallback).await {
        Ok(outcome) => Json(ApiResponse::ok(
            format!("Profile for {} created", params.username),
            CreateProfileResult {
                username: params.username.to_string(),
                path: outcome.path.display().to_string(),
                checksum: outcome.checksum,
                used_fallback: outcome.used_fallback,
            },
        ))
        .into_response(),
        Err(e) => {
            error!(username = %params.username, error = %e, "Profile creation failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Revoke a user and remove their profile.
pub async fn delete_profile(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Response {
    let username = match Username::parse(username) {
        Ok(u) => u,
        Err(e) => return bad_request(e),
    };

    let _guard = state.locks.lock(username.as_str()).await;
    match state.revocation.revoke(&username).await {
        Ok(_) => Json(ApiResponse::message(format!(
            "User {} deleted successfully",
            username
        )))
        .into_response(),
        Err(RevokeError::NotFound(_)) => json_error(StatusCode::NOT_FOUND, "User does not exist"),
        Err(e) => {
            error!(username = %username, error = %e, "Profile deletion failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Serve the raw profile as a download.
pub async fn download_profile(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Response {
    let username = match Username::parse(username) {
        Ok(u) => u,
        Err(e) => return bad_request(e),
    };

    let _guard = state.locks.lock(username.as_str()).await;
    match state.profiles.read(&username).await {
        Ok(Some(bytes)) => (
            [
                (header::CONTENT_TYPE, PROFILE_CONTENT_TYPE.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}.ovpn\"", username),
                ),
            ],
            bytes,
        )
            .into_response(),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "User does not exist"),
        Err(e) => {
            error!(username = %username, error = %e, "Failed to read profile");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read profile")
        }
    }
}
