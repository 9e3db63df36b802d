//! HTTP server for the worker.
//!
//! Provides endpoints for:
//! - Profile creation and deletion (`/api/ovpn/create`, `/api/ovpn/delete/{username}`)
//! - Profile download (`/api/ovpn/{username}`)
//! - Health check (`/health`)
//!
//! Every route is rate-limited per peer address; all but `/health` require
//! the API key when one is configured.

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use vpnfleet_proto::paths;

use crate::state::AppState;

mod auth;
mod handlers;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route(paths::CREATE_PROFILE, post(handlers::create_profile))
        .route(paths::DELETE_PROFILE_ROUTE, delete(handlers::delete_profile))
        .route(paths::FETCH_PROFILE_ROUTE, get(handlers::download_profile))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .merge(protected)
        .route(paths::HEALTH, get(handlers::health_check))
        .layer(middleware::from_fn_with_state(state.clone(), auth::rate_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
