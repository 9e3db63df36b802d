//! Fleet node records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{HealthStatus, NodeId, NodeKind};

/// A machine known to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node name.
    pub id: NodeId,

    /// Address the controller uses to reach the node's API.
    pub host: String,

    /// Port of the node's API.
    pub port: u16,

    pub kind: NodeKind,

    /// Disabled nodes are never selected for new users.
    pub enabled: bool,

    pub health: HealthStatus,

    /// Last heartbeat or successful sync.
    pub last_sync: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Node {
    /// Create an enabled worker node with unknown health.
    pub fn worker(id: NodeId, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            host: host.into(),
            port,
            kind: NodeKind::Worker,
            enabled: true,
            health: HealthStatus::Unknown,
            last_sync: None,
            created_at: Utc::now(),
        }
    }

    /// Base URL of the node's HTTP API.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Whether the node can be handed new users.
    pub fn is_selectable(&self) -> bool {
        self.enabled && self.kind == NodeKind::Worker
    }

    /// Builder method to override the creation timestamp.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}
