//! Endpoint paths.
//!
//! `*_ROUTE` constants are axum route patterns; the functions build
//! concrete request paths for clients.

pub const HEALTH: &str = "/health";
pub const METRICS: &str = "/metrics";

// Worker -> controller
pub const REGISTER: &str = "/api/endnodes/register";
pub const HEARTBEAT_ROUTE: &str = "/api/endnodes-health/:server_id";
pub const DEREGISTER_ROUTE: &str = "/api/endnodes/:server_id/deregister";

// Controller -> worker
pub const CREATE_PROFILE: &str = "/api/ovpn/create";
pub const DELETE_PROFILE_ROUTE: &str = "/api/ovpn/delete/:username";
pub const FETCH_PROFILE_ROUTE: &str = "/api/ovpn/:username";

// Operator -> controller
pub const NODES: &str = "/api/endnodes";
pub const NODE_ROUTE: &str = "/api/endnodes/:server_id";
pub const USERS: &str = "/api/users";
pub const USER_ROUTE: &str = "/api/users/:username";
pub const USER_PROFILE_ROUTE: &str = "/api/users/:username/profile";

pub fn heartbeat(server_id: &str) -> String {
    format!("/api/endnodes-health/{}", server_id)
}

pub fn deregister(server_id: &str) -> String {
    format!("/api/endnodes/{}/deregister", server_id)
}

pub fn delete_profile(username: &str) -> String {
    format!("/api/ovpn/delete/{}", username)
}

pub fn fetch_profile(username: &str) -> String {
    format!("/api/ovpn/{}", username)
}
