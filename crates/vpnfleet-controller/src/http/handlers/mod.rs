//! HTTP request handlers.

mod health;
mod nodes;
mod users;

pub use health::{health_check, metrics_handler};
pub use nodes::{deregister_node, heartbeat, list_nodes, register_node, remove_node};
pub use users::{create_user, delete_user, download_profile};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use vpnfleet_proto::ErrorBody;

use crate::service::ServiceError;

/// Map a service error onto a status code and JSON error body.
fn error_response(e: ServiceError) -> Response {
    let status = match &e {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::NodeNotFound(_) | ServiceError::UserNotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::UserExists(_) => StatusCode::CONFLICT,
        ServiceError::NoAvailableNode => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::ProfileUnavailable { .. } | ServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
        ServiceError::Store(_) => {
            error!(error = %e, "Store failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (status, Json(ErrorBody::new(e.to_string()))).into_response()
}
