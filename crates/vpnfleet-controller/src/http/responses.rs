//! HTTP request and response types.

use serde::{Deserialize, Serialize};

use vpnfleet_core::{Node, User};

// ============================================================================
// Node types
// ============================================================================

/// Response for a single node.
#[derive(Debug, Serialize, Deserialize)]
pub struct NodeResponse {
    pub server_id: String,
    pub host: String,
    pub port: u16,
    pub kind: String,
    pub enabled: bool,
    pub health: String,
    pub active_users: usize,
    pub last_sync: Option<String>,
    pub created_at: String,
}

impl NodeResponse {
    pub fn new(node: &Node, active_users: usize) -> Self {
        Self {
            server_id: node.id.to_string(),
            host: node.host.clone(),
            port: node.port,
            kind: format!("{:?}", node.kind).to_lowercase(),
            enabled: node.enabled,
            health: node.health.to_string(),
            active_users,
            last_sync: node.last_sync.map(|t| t.to_rfc3339()),
            created_at: node.created_at.to_rfc3339(),
        }
    }
}

/// A node offered as an alternative.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub server_id: String,
    pub host: String,
    pub port: u16,
}

impl From<&Node> for RecommendationResponse {
    fn from(node: &Node) -> Self {
        Self {
            server_id: node.id.to_string(),
            host: node.host.clone(),
            port: node.port,
        }
    }
}

// ============================================================================
// User types
// ============================================================================

/// Request body for creating a user.
#[derive(Debug, Deserialize)]
pub struct CreateUserBody {
    pub username: String,
    #[serde(default)]
    pub port: Option<i64>,
    #[serde(default)]
    pub protocol: Option<String>,
    /// Preferred node.
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Response for a single user.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub username: String,
    pub server_id: String,
    pub port: u16,
    pub protocol: String,
    pub active: bool,
    pub synced: bool,
    pub checksum: Option<String>,
    pub created_by: String,
    pub created_at: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.to_string(),
            server_id: user.node_id.to_string(),
            port: user.port,
            protocol: user.protocol.to_string(),
            active: user.active,
            synced: user.synced,
            checksum: user.checksum.clone(),
            created_by: user.created_by.clone(),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Response body for user creation.
#[derive(Debug, Serialize, Deserialize)]
pub struct PlacementResponse {
    pub user: UserResponse,
    pub server: RecommendationResponse,
    pub recommendations: Vec<RecommendationResponse>,
}

/// Response body for user deletion.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteUserResponse {
    pub username: String,
    pub removed_from: Vec<String>,
    pub failed: Vec<String>,
}
