//! HTTP server for the controller.
//!
//! Provides endpoints for:
//! - Worker registration, heartbeat and deregistration (`/api/endnodes*`)
//! - Operator node and user management (`/api/endnodes`, `/api/users`)
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)

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
pub mod responses;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Registration and operator routes require the API key
    let protected = Router::new()
        .route(paths::REGISTER, post(handlers::register_node))
        .route(paths::DEREGISTER_ROUTE, post(handlers::deregister_node))
        .route(paths::NODES, get(handlers::list_nodes))
        .route(paths::NODE_ROUTE, delete(handlers::remove_node))
        .route(paths::USERS, post(handlers::create_user))
        .route(paths::USER_ROUTE, delete(handlers::delete_user))
        .route(paths::USER_PROFILE_ROUTE, get(handlers::download_profile))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .merge(protected)
        .route(paths::HEARTBEAT_ROUTE, post(handlers::heartbeat))
        .route(paths::HEALTH, get(handlers::health_check))
        .route(paths::METRICS, get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::client::testing::FakeNodeClient;
    use crate::service::tests::{fixture, register, Fixture};
    use crate::store::{MemoryStore, Store};
    use vpnfleet_core::{Node, NodeId};

    fn app(api_key: &str) -> (Router, Arc<MemoryStore>, Arc<FakeNodeClient>) {
        let Fixture {
            store,
            client,
            service,
            ..
        } = fixture();
        let router = create_router(AppState::new(service, api_key, "mgmt-1"));
        (router, store, client)
    }

    async fn add_worker(store: &MemoryStore, id: &str) {
        store
            .upsert_node(Node::worker(NodeId::parse(id).unwrap(), "10.0.0.5", 8080))
            .await
            .unwrap();
    }

    fn json_request(method: Method, uri: &str, key: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(key) = key {
            builder = builder.header("x-api-key", key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let (router, _, _) = app("secret");
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["server_id"], "mgmt-1");
    }

    #[tokio::test]
    async fn test_register_requires_key() {
        let (router, _, _) = app("secret");
        let body = serde_json::to_value(register("w1")).unwrap();

        let denied = router
            .clone()
            .oneshot(json_request(Method::POST, paths::REGISTER, None, body.clone()))
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = router
            .oneshot(json_request(Method::POST, paths::REGISTER, Some("secret"), body))
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
        let body = body_json(allowed).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["server_id"], "w1");
    }

    #[tokio::test]
    async fn test_heartbeat_is_unauthenticated() {
        let (router, store, _) = app("secret");
        add_worker(&store, "w1").await;

        let hb = serde_json::json!({"server_id": "w1", "status": "healthy", "timestamp": 1});
        let response = router
            .clone()
            .oneshot(json_request(Method::POST, &paths::heartbeat("w1"), None, hb.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let unknown = router
            .oneshot(json_request(Method::POST, &paths::heartbeat("w9"), None, hb))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_and_download_user() {
        let (router, store, _) = app("");
        add_worker(&store, "w1").await;

        let created = router
            .clone()
            .oneshot(json_request(
                Method::POST,
                paths::USERS,
                None,
                serde_json::json!({"username": "alice", "protocol": "tcp", "port": 1195}),
            ))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let body = body_json(created).await;
        assert_eq!(body["data"]["server"]["server_id"], "w1");
        assert_eq!(body["data"]["user"]["synced"], true);

        let download = router
            .oneshot(
                Request::get("/api/users/alice/profile")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(download.status(), StatusCode::OK);
        assert_eq!(
            download.headers()[header::CONTENT_TYPE],
            "application/x-openvpn-profile"
        );
        assert_eq!(
            download.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"alice.ovpn\""
        );
        let bytes = to_bytes(download.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("proto tcp"));
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let (router, _, client) = app("");

        let no_nodes = router
            .clone()
            .oneshot(json_request(
                Method::POST,
                paths::USERS,
                None,
                serde_json::json!({"username": "alice"}),
            ))
            .await
            .unwrap();
        assert_eq!(no_nodes.status(), StatusCode::SERVICE_UNAVAILABLE);

        let bad_name = router
            .clone()
            .oneshot(json_request(
                Method::POST,
                paths::USERS,
                None,
                serde_json::json!({"username": "../etc"}),
            ))
            .await
            .unwrap();
        assert_eq!(bad_name.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(bad_name).await["error"].is_string());

        let missing = router
            .oneshot(
                Request::delete("/api/users/carol")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert!(client.deletes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (router, _, _) = app("secret");
        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("vpnfleet_users"));
    }
}
