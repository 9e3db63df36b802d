//! Persistence Service interface and the in-memory implementation.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use vpnfleet_core::{HealthStatus, Node, NodeId, NodeKind, User, Username};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("User not found: {0}")]
    UserNotFound(Username),

    #[error("User already exists: {0}")]
    UserExists(Username),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// CRUD over nodes and users plus the few queries the controller needs.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or refresh a node keyed by its id. An existing node keeps its
    /// `created_at`.
    async fn upsert_node(&self, node: Node) -> Result<Node, StoreError>;

    async fn get_node(&self, id: &NodeId) -> Result<Option<Node>, StoreError>;

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError>;

    /// Enabled nodes of kind worker.
    async fn list_enabled_workers(&self) -> Result<Vec<Node>, StoreError>;

    async fn set_node_enabled(&self, id: &NodeId, enabled: bool) -> Result<(), StoreError>;

    async fn set_node_health(&self, id: &NodeId, health: HealthStatus) -> Result<(), StoreError>;

    async fn touch_node_sync(&self, id: &NodeId, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn remove_node(&self, id: &NodeId) -> Result<Node, StoreError>;

    async fn upsert_user(&self, user: User) -> Result<(), StoreError>;

    /// Insert a user only if the username is free. The check and the write
    /// happen atomically.
    async fn insert_user(&self, user: User) -> Result<(), StoreError>;

    async fn get_user(&self, username: &Username) -> Result<Option<User>, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    async fn delete_user(&self, username: &Username) -> Result<User, StoreError>;

    async fn mark_user_synced(
        &self,
        username: &Username,
        checksum: Option<String>,
    ) -> Result<(), StoreError>;

    /// Number of active users assigned to each node.
    async fn active_user_counts(&self) -> Result<HashMap<NodeId, usize>, StoreError>;
}

/// Store backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    nodes: RwLock<HashMap<NodeId, Node>>,
    users: RwLock<HashMap<Username, User>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_node(&self, mut node: Node) -> Result<Node, StoreError> {
        let mut nodes = self.nodes.write().await;
        if let Some(existing) = nodes.get(&node.id) {
            node.created_at = existing.created_at;
        }
        nodes.insert(node.id.clone(), node.clone());
        Ok(node)
    }

    async fn get_node(&self, id: &NodeId) -> Result<Option<Node>, StoreError> {
        Ok(self.nodes.read().await.get(id).cloned())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError> {
        let mut nodes: Vec<Node> = self.nodes.read().await.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    async fn list_enabled_workers(&self) -> Result<Vec<Node>, StoreError> {
        Ok(self
            .list_nodes()
            .await?
            .into_iter()
            .filter(|n| n.enabled && n.kind == NodeKind::Worker)
            .collect())
    }

    async fn set_node_enabled(&self, id: &NodeId, enabled: bool) -> Result<(), StoreError> {
        let mut nodes = self.nodes.write().await;
        let node = nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::NodeNotFound(id.clone()))?;
        node.enabled = enabled;
        Ok(())
    }

    async fn set_node_health(&self, id: &NodeId, health: HealthStatus) -> Result<(), StoreError> {
        let mut nodes = self.nodes.write().await;
        let node = nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::NodeNotFound(id.clone()))?;
        node.health = health;
        Ok(())
    }

    async fn touch_node_sync(&self, id: &NodeId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut nodes = self.nodes.write().await;
        let node = nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::NodeNotFound(id.clone()))?;
        node.last_sync = Some(at);
        Ok(())
    }

    async fn remove_node(&self, id: &NodeId) -> Result<Node, StoreError> {
        self.nodes
            .write()
            .await
            .remove(id)
            .ok_or_else(|| StoreError::NodeNotFound(id.clone()))
    }

    async fn upsert_user(&self, user: User) -> Result<(), StoreError> {
        self.users
            .write()
            .await
            .insert(user.username.clone(), user);
        Ok(())
    }

    async fn insert_user(&self, user: User) -> Result<(), StoreError> {
        match self.users.write().await.entry(user.username.clone()) {
            Entry::Occupied(_) => Err(StoreError::UserExists(user.username)),
            Entry::Vacant(slot) => {
                slot.insert(user);
                Ok(())
            }
        }
    }

    async fn get_user(&self, username: &Username) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(username).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn delete_user(&self, username: &Username) -> Result<User, StoreError> {
        self.users
            .write()
            .await
            .remove(username)
            .ok_or_else(|| StoreError::UserNotFound(username.clone()))
    }

    async fn mark_user_synced(
        &self,
        username: &Username,
        checksum: Option<String>,
    ) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(username)
            .ok_or_else(|| StoreError::UserNotFound(username.clone()))?;
        user.synced = true;
        if checksum.is_some() {
            user.checksum = checksum;
        }
        Ok(())
    }

    async fn active_user_counts(&self) -> Result<HashMap<NodeId, usize>, StoreError> {
        let users = self.users.read().await;
        let mut counts = HashMap::new();
        for user in users.values().filter(|u| u.active) {
            *counts.entry(user.node_id.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
