//! Sync coordinator - pushes users to worker nodes.
//!
//! Every tick each enabled worker receives the users assigned to it plus
//! every user not yet synced anywhere. A freshly registered node receives
//! the whole fleet (backfill). Failures wait for the next tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use vpnfleet_core::{CertificateBundle, Node, User};
use vpnfleet_proto::CreateProfileRequest;

use crate::audit::{AuditAction, AuditEvent, AuditSink};
use crate::client::NodeClient;
use crate::store::{Store, StoreError};

/// Counters for one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl SyncReport {
    fn absorb(&mut self, other: SyncReport) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}

/// Reconciles user placement against the fleet.
pub struct SyncCoordinator {
    store: Arc<dyn Store>,
    client: Arc<dyn NodeClient>,
    audit: Arc<dyn AuditSink>,
    interval: Duration,
    /// Sent with every push; workers only embed it when their own PKI fails.
    fallback: CertificateBundle,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<dyn Store>,
        client: Arc<dyn NodeClient>,
        audit: Arc<dyn AuditSink>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            client,
            audit,
            interval,
            fallback: CertificateBundle::placeholder(),
        }
    }

    /// Run the sync loop forever.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match self.sync_once().await {
                Ok(report) => debug!(
                    attempted = report.attempted,
                    succeeded = report.succeeded,
                    failed = report.failed,
                    "Sync round complete"
                ),
                Err(e) => error!(error = %e, "User sync coordination failed"),
            }
        }
    }

    /// One reconciliation pass over every enabled worker.
    pub async fn sync_once(&self) -> Result<SyncReport, StoreError> {
        let users = self.store.list_users().await?;
        let nodes = self.store.list_enabled_workers().await?;

        let mut report = SyncReport::default();
        for node in &nodes {
            let candidates: Vec<&User> = users
                .iter()
                .filter(|u| u.node_id == node.id || !u.synced)
                .collect();
            report.absorb(self.push_users(node, &candidates, true).await);
        }

        Ok(report)
    }

    /// Push every user in the fleet to `node`.
    ///
    /// Sync flags are left alone; the node is not the users' assigned node.
    pub async fn backfill(&self, node: &Node) -> Result<SyncReport, StoreError> {
        let users = self.store.list_users().await?;
        if users.is_empty() {
            info!(node = %node.id, "No existing users to backfill");
            return Ok(SyncReport::default());
        }

        info!(node = %node.id, users = users.len(), "Backfilling users to new node");
        let all: Vec<&User> = users.iter().collect();
        let report = self.push_users(node, &all, false).await;
        info!(
            node = %node.id,
            succeeded = report.succeeded,
            failed = report.failed,
            "Backfill complete"
        );
        Ok(report)
    }

    /// Push one user to one node. Returns the checksum the node reported.
    pub async fn push_user(&self, node: &Node, user: &User) -> Result<String, crate::client::ClientError> {
        let request = CreateProfileRequest::for_user(user, node.host.clone(), self.fallback.clone());
        let result = self.client.create_profile(node, &request).await?;
        if result.used_fallback {
            warn!(
                node = %node.id,
                username = %user.username,
                "Node embedded fallback certificates"
            );
        }
        Ok(result.checksum)
    }

    async fn push_users(&self, node: &Node, users: &[&User], mark_synced: bool) -> SyncReport {
        let mut report = SyncReport::default();
        let mut any_success = false;

        for user in users {
            report.attempted += 1;
            match self.push_user(node, user).await {
                Ok(checksum) => {
                    report.succeeded += 1;
                    any_success = true;
                    if mark_synced {
                        self.mark_synced(node, user, checksum).await;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        node = %node.id,
                        username = %user.username,
                        error = %e,
                        "Failed to sync user to node"
                    );
                }
            }
        }

        if any_success {
            if let Err(e) = self.store.touch_node_sync(&node.id, Utc::now()).await {
                warn!(node = %node.id, error = %e, "Failed to record node sync time");
            }
        }

        report
    }

    async fn mark_synced(&self, node: &Node, user: &User, checksum: String) {
        // Only the assigned node's fingerprint is kept on the user
        let checksum = (user.node_id == node.id).then_some(checksum);
        if let Err(e) = self.store.mark_user_synced(&user.username, checksum).await {
            warn!(username = %user.username, error = %e, "Failed to mark user synced");
            return;
        }
        if !user.synced {
            self.audit.record(
                AuditEvent::new(
                    AuditAction::UserSynced,
                    user.username.as_str(),
                    format!("user synced to end-node {}", node.id),
                )
                .with_node(node.id.clone()),
            );
        }
    }
}
