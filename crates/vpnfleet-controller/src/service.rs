//! Fleet service - the controller operations behind the HTTP surface.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use vpnfleet_core::{
    validate_port, CoreError, HealthStatus, Node, NodeId, Protocol, User, Username,
    DEFAULT_CLIENT_PORT,
};
use vpnfleet_proto::{HeartbeatRequest, RegisterRequest};

use crate::audit::{AuditAction, AuditEvent, AuditSink};
use crate::client::{ClientError, NodeClient};
use crate::selector::{NodeSelector, SelectorError};
use crate::store::{Store, StoreError};
use crate::sync::SyncCoordinator;

/// Service errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] CoreError),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("User not found: {0}")]
    UserNotFound(Username),

    #[error("User already exists: {0}")]
    UserExists(Username),

    #[error("No available node")]
    NoAvailableNode,

    #[error("Profile for {username} unavailable on node {node}")]
    ProfileUnavailable { username: Username, node: NodeId },

    #[error("Node request failed: {0}")]
    Upstream(#[from] ClientError),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NodeNotFound(id) => Self::NodeNotFound(id),
            StoreError::UserNotFound(u) => Self::UserNotFound(u),
            StoreError::UserExists(u) => Self::UserExists(u),
            other => Self::Store(other),
        }
    }
}

impl From<SelectorError> for ServiceError {
    fn from(e: SelectorError) -> Self {
        match e {
            SelectorError::NoAvailableNode => Self::NoAvailableNode,
            SelectorError::Store(e) => e.into(),
        }
    }
}

/// Input for creating a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub port: Option<i64>,
    pub protocol: Option<String>,
    pub preferred_node: Option<String>,
    pub created_by: String,
}

/// Where a new user landed.
#[derive(Debug, Clone)]
pub struct Placement {
    pub user: User,
    pub node: Node,
    pub recommendations: Vec<Node>,
}

/// A node registration and its background backfill.
pub struct Registration {
    pub node: Node,
    pub backfill: JoinHandle<()>,
}

/// Per-node results of a user teardown.
#[derive(Debug, Clone, Default)]
pub struct DeleteReport {
    pub removed_from: Vec<NodeId>,
    pub failed: Vec<NodeId>,
}

/// A downloadable profile and where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedProfile {
    pub node: Node,
    pub profile: Vec<u8>,
    pub recommendations: Vec<Node>,
}

/// Controller-side fleet operations.
pub struct FleetService {
    store: Arc<dyn Store>,
    client: Arc<dyn NodeClient>,
    audit: Arc<dyn AuditSink>,
    selector: NodeSelector,
    sync: Arc<SyncCoordinator>,
}

impl FleetService {
    pub fn new(
        store: Arc<dyn Store>,
        client: Arc<dyn NodeClient>,
        audit: Arc<dyn AuditSink>,
        sync: Arc<SyncCoordinator>,
    ) -> Self {
        Self {
            selector: NodeSelector::new(store.clone()),
            store,
            client,
            audit,
            sync,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Register (or re-register) a worker and backfill it in the background.
    pub async fn register_node(&self, req: RegisterRequest) -> Result<Registration, ServiceError> {
        let id = NodeId::parse(req.server_id)?;
        let host = req.host.trim().to_string();
        if host.is_empty() {
            return Err(CoreError::InvalidInput("host is required".to_string()).into());
        }
        if req.port == 0 {
            return Err(CoreError::InvalidPort(0).into());
        }

        let mut node = Node::worker(id, host, req.port);
        node.health = match HealthStatus::from_reported(&req.status) {
            HealthStatus::Unknown => HealthStatus::Healthy,
            status => status,
        };
        node.last_sync = Some(Utc::now());
        let node = self.store.upsert_node(node).await?;

        info!(node = %node.id, host = %node.host, port = node.port, "End-node registered");
        self.audit.record(
            AuditEvent::new(
                AuditAction::EndnodeRegistered,
                node.id.as_str(),
                format!(
                    "end-node registered - host={} port={} status={}",
                    node.host, node.port, req.status
                ),
            )
            .with_node(node.id.clone()),
        );

        let sync = self.sync.clone();
        let target = node.clone();
        let backfill = tokio::spawn(async move {
            if let Err(e) = sync.backfill(&target).await {
                warn!(node = %target.id, error = %e, "Failed to backfill new end-node");
            }
        });

        Ok(Registration { node, backfill })
    }

    /// Record a heartbeat from a registered worker.
    pub async fn heartbeat(&self, server_id: &str, req: HeartbeatRequest) -> Result<(), ServiceError> {
        let id = NodeId::parse(server_id)?;
        if req.server_id != server_id {
            warn!(node = %id, body_id = %req.server_id, "Heartbeat body names a different node");
        }

        if self.store.get_node(&id).await?.is_none() {
            return Err(ServiceError::NodeNotFound(id));
        }

        self.store
            .set_node_health(&id, HealthStatus::from_reported(&req.status))
            .await?;
        self.store.touch_node_sync(&id, Utc::now()).await?;
        Ok(())
    }

    /// Disable a worker. It stays registered.
    pub async fn deregister_node(&self, server_id: &str) -> Result<(), ServiceError> {
        let id = NodeId::parse(server_id)?;
        self.store.set_node_enabled(&id, false).await?;

        info!(node = %id, "End-node deregistered");
        self.audit.record(
            AuditEvent::new(
                AuditAction::EndnodeDeregistered,
                id.as_str(),
                "end-node deregistered",
            )
            .with_node(id),
        );
        Ok(())
    }

    /// Delete a node record. Admin action.
    pub async fn remove_node(&self, server_id: &str) -> Result<Node, ServiceError> {
        let id = NodeId::parse(server_id)?;
        let node = self.store.remove_node(&id).await?;

        self.audit.record(
            AuditEvent::new(
                AuditAction::EndnodeRemoved,
                id.as_str(),
                format!("end-node '{}' removed from system", id),
            )
            .with_node(id),
        );
        Ok(node)
    }

    /// All nodes with their active user counts.
    pub async fn list_nodes(&self) -> Result<Vec<(Node, usize)>, ServiceError> {
        let nodes = self.store.list_nodes().await?;
        let counts = self.store.active_user_counts().await?;
        Ok(nodes
            .into_iter()
            .map(|n| {
                let count = counts.get(&n.id).copied().unwrap_or(0);
                (n, count)
            })
            .collect())
    }

    /// Place a new user on a node and push its profile there.
    ///
    /// A failed push leaves the user unsynced for the sync loop to retry.
    pub async fn create_user(&self, new: NewUser) -> Result<Placement, ServiceError> {
        let username = Username::parse(new.username)?;
        let port = match new.port {
            Some(p) => validate_port(p)?,
            None => DEFAULT_CLIENT_PORT,
        };
        let protocol = match new.protocol.as_deref() {
            Some(p) => p.parse::<Protocol>()?,
            None => Protocol::default(),
        };
        let preferred = new.preferred_node.map(NodeId::parse).transpose()?;

        if self.store.get_user(&username).await?.is_some() {
            return Err(ServiceError::UserExists(username));
        }

        let node = self.selector.select(preferred.as_ref()).await?;
        let mut user = User::new(username, node.id.clone(), port, protocol, new.created_by)?;
        // A concurrent create may have claimed the name since the check above.
        self.store.insert_user(user.clone()).await?;

        self.audit.record(
            AuditEvent::new(
                AuditAction::UserCreated,
                user.username.as_str(),
                format!("user created via management server for server {}", node.id),
            )
            .with_node(node.id.clone()),
        );

        match self.sync.push_user(&node, &user).await {
            Ok(checksum) => {
                self.store
                    .mark_user_synced(&user.username, Some(checksum.clone()))
                    .await?;
                user.synced = true;
                user.checksum = Some(checksum);
                info!(username = %user.username, node = %node.id, "User provisioned");
            }
            Err(e) => {
                warn!(
                    username = %user.username,
                    node = %node.id,
                    error = %e,
                    "Initial profile push failed, leaving for sync"
                );
            }
        }

        let recommendations = self.selector.recommendations(&node.id).await;
        Ok(Placement {
            user,
            node,
            recommendations,
        })
    }

    /// Remove a user and tear its profile down on every enabled worker.
    pub async fn delete_user(&self, username: &str) -> Result<DeleteReport, ServiceError> {
        let username = Username::parse(username)?;
        self.store.delete_user(&username).await?;

        self.audit.record(AuditEvent::new(
            AuditAction::UserDeleted,
            username.as_str(),
            "user deleted via management server",
        ));

        let mut report = DeleteReport::default();
        for node in self.store.list_enabled_workers().await? {
            match self.client.delete_profile(&node, &username).await {
                Ok(()) => report.removed_from.push(node.id),
                Err(ClientError::NotFound) => {}
                Err(e) => {
                    warn!(
                        username = %username,
                        node = %node.id,
                        error = %e,
                        "Failed to delete user on end-node"
                    );
                    report.failed.push(node.id);
                }
            }
        }

        Ok(report)
    }

    /// Fetch a user's profile from the best node, creating it there if missing.
    pub async fn resolve_profile(&self, username: &str) -> Result<ResolvedProfile, ServiceError> {
        let username = Username::parse(username)?;
        let user = self
            .store
            .get_user(&username)
            .await?
            .ok_or_else(|| ServiceError::UserNotFound(username.clone()))?;

        let node = self.selector.select(Some(&user.node_id)).await?;

        let profile = match self.client.fetch_profile(&node, &username).await? {
            Some(profile) => profile,
            None => {
                info!(username = %username, node = %node.id, "Profile missing on node, creating");
                self.sync.push_user(&node, &user).await?;
                self.client
                    .fetch_profile(&node, &username)
                    .await?
                    .ok_or_else(|| ServiceError::ProfileUnavailable {
                        username: username.clone(),
                        node: node.id.clone(),
                    })?
            }
        };

        let recommendations = self.selector.recommendations(&node.id).await;
        Ok(ResolvedProfile {
            node,
            profile,
            recommendations,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use super::*;
    use crate::audit::testing::RecordingAuditSink;
    use crate::client::testing::FakeNodeClient;
    use crate::store::MemoryStore;

    pub(crate) struct Fixture {
        pub store: Arc<MemoryStore>,
        pub client: Arc<FakeNodeClient>,
        pub audit: Arc<RecordingAuditSink>,
        pub service: FleetService,
    }

    pub(crate) fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let client = Arc::new(FakeNodeClient::default());
        let audit = Arc::new(RecordingAuditSink::default());
        let sync = Arc::new(SyncCoordinator::new(
            store.clone(),
            client.clone(),
            audit.clone(),
            Duration::from_secs(60),
        ));
        let service = FleetService::new(store.clone(), client.clone(), audit.clone(), sync);
        Fixture {
            store,
            client,
            audit,
            service,
        }
    }

    pub(crate) fn register(id: &str) -> RegisterRequest {
        RegisterRequest {
            server_id: id.to_string(),
            host: "10.0.0.5".to_string(),
            port: 8080,
            status: "active".to_string(),
        }
    }

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.to_string(),
            created_by: "operator".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_register_then_backfill() {
        let f = fixture();
        f.service.register_node(register("w1")).await.unwrap().backfill.await.unwrap();
        f.service.create_user(new_user("alice")).await.unwrap();

        let reg = f.service.register_node(register("w3")).await.unwrap();
        assert!(reg.node.enabled);
        assert_eq!(reg.node.health, HealthStatus::Healthy);
        reg.backfill.await.unwrap();

        assert_eq!(f.client.creates_for("w3"), vec!["alice"]);
        assert_eq!(f.audit.count(AuditAction::EndnodeRegistered), 2);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let f = fixture();
        let mut req = register("w1");
        req.host = " ".into();
        assert!(matches!(
            f.service.register_node(req).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            f.service.register_node(register("")).await,
            Err(ServiceError::Validation(CoreError::InvalidNodeId(_)))
        ));
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_node() {
        let f = fixture();
        let result = f
            .service
            .heartbeat("ghost", HeartbeatRequest::healthy("ghost"))
            .await;
        assert!(matches!(result, Err(ServiceError::NodeNotFound(_))));
    }

    #[tokio::test]
    async fn test_heartbeat_records_health() {
        let f = fixture();
        f.service.register_node(register("w1")).await.unwrap();
        let mut hb = HeartbeatRequest::healthy("w1");
        hb.status = "degraded".into();
        f.service.heartbeat("w1", hb).await.unwrap();

        let node = f.store.get_node(&NodeId::parse("w1").unwrap()).await.unwrap().unwrap();
        assert_eq!(node.health, HealthStatus::Unhealthy);
        assert!(node.last_sync.is_some());
    }

    #[tokio::test]
    async fn test_deregister_disables_and_remove_deletes() {
        let f = fixture();
        f.service.register_node(register("w1")).await.unwrap();

        f.service.deregister_node("w1").await.unwrap();
        let node = f.store.get_node(&NodeId::parse("w1").unwrap()).await.unwrap().unwrap();
        assert!(!node.enabled);

        f.service.remove_node("w1").await.unwrap();
        assert!(f.store.get_node(&NodeId::parse("w1").unwrap()).await.unwrap().is_none());
        assert!(matches!(
            f.service.remove_node("w1").await,
            Err(ServiceError::NodeNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_user_pushes_to_selected_node() {
        let f = fixture();
        f.service.register_node(register("w1")).await.unwrap();

        let placement = f.service.create_user(new_user("alice")).await.unwrap();
        assert_eq!(placement.node.id.as_str(), "w1");
        assert!(placement.user.synced);
        assert_eq!(placement.user.port, DEFAULT_CLIENT_PORT);
        assert_eq!(placement.user.protocol, Protocol::Udp);
        assert!(f.client.has_profile("w1", "alice"));

        assert!(matches!(
            f.service.create_user(new_user("alice")).await,
            Err(ServiceError::UserExists(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_creates_admit_one() {
        let f = fixture();
        f.service.register_node(register("w1")).await.unwrap().backfill.await.unwrap();

        for i in 0..20 {
            let name = format!("racer{i}");
            let (a, b) = tokio::join!(
                f.service.create_user(new_user(&name)),
                f.service.create_user(new_user(&name)),
            );
            let (ok, rejected) = match (a, b) {
                (Ok(p), Err(e)) | (Err(e), Ok(p)) => (p, e),
                (a, b) => panic!("expected one winner for {name}, got {a:?} and {b:?}"),
            };
            assert_eq!(ok.user.username.as_str(), name);
            assert!(matches!(rejected, ServiceError::UserExists(u) if u.as_str() == name));
        }

        assert_eq!(f.store.list_users().await.unwrap().len(), 20);
        assert_eq!(f.audit.count(AuditAction::UserCreated), 20);
        assert_eq!(f.client.creates_for("w1").len(), 20);
    }

    #[tokio::test]
    async fn test_create_user_push_failure_leaves_unsynced() {
        let f = fixture();
        f.service.register_node(register("w1")).await.unwrap();
        f.client.set_down("w1");

        let placement = f.service.create_user(new_user("alice")).await.unwrap();
        assert!(!placement.user.synced);
        let stored = f
            .store
            .get_user(&Username::parse("alice").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.synced);
    }

    #[tokio::test]
    async fn test_create_user_without_nodes() {
        let f = fixture();
        assert!(matches!(
            f.service.create_user(new_user("alice")).await,
            Err(ServiceError::NoAvailableNode)
        ));
        assert!(f.store.list_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_user_validates_before_side_effects() {
        let f = fixture();
        f.service.register_node(register("w1")).await.unwrap();

        let mut bad = new_user("alice");
        bad.protocol = Some("icmp".into());
        assert!(matches!(
            f.service.create_user(bad).await,
            Err(ServiceError::Validation(CoreError::InvalidProtocol(_)))
        ));
        assert!(matches!(
            f.service.create_user(new_user("root")).await,
            Err(ServiceError::Validation(CoreError::ReservedUsername(_)))
        ));
        assert!(f.client.creates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_user_everywhere() {
        let f = fixture();
        f.service.register_node(register("w1")).await.unwrap().backfill.await.unwrap();
        f.service.create_user(new_user("alice")).await.unwrap();
        f.service.register_node(register("w2")).await.unwrap().backfill.await.unwrap();
        assert!(f.client.has_profile("w2", "alice"));

        let report = f.service.delete_user("alice").await.unwrap();
        assert_eq!(report.removed_from.len(), 2);
        assert!(report.failed.is_empty());
        assert!(!f.client.has_profile("w1", "alice"));
        assert!(!f.client.has_profile("w2", "alice"));

        assert!(matches!(
            f.service.delete_user("alice").await,
            Err(ServiceError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_profile_creates_when_missing() {
        let f = fixture();
        f.service.register_node(register("w1")).await.unwrap();
        f.client.set_down("w1");
        f.service.create_user(new_user("alice")).await.unwrap();
        assert!(!f.client.has_profile("w1", "alice"));

        // node comes back without the profile
        f.client.set_up("w1");

        let resolved = f.service.resolve_profile("alice").await.unwrap();
        assert_eq!(resolved.node.id.as_str(), "w1");
        assert!(String::from_utf8(resolved.profile).unwrap().contains("proto udp"));
    }
}
