//! Health monitor - periodic liveness probes of worker nodes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use vpnfleet_core::{HealthStatus, Node, NodeId, NodeKind};

use crate::audit::{AuditAction, AuditEvent, AuditSink};
use crate::client::NodeClient;
use crate::store::Store;

/// Outcome of probing one node.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub node: NodeId,
    pub status: HealthStatus,
    pub response_time: Duration,
    pub error: Option<String>,
}

/// Probes every registered worker on a fixed interval.
///
/// Unhealthy nodes are recorded, never disabled.
pub struct HealthMonitor {
    store: Arc<dyn Store>,
    client: Arc<dyn NodeClient>,
    audit: Arc<dyn AuditSink>,
    interval: Duration,
}

impl HealthMonitor {
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
        }
    }

    /// Run the probe loop forever.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let outcomes = self.check_all().await;
            debug!(probed = outcomes.len(), "Health round complete");
        }
    }

    /// Probe all worker nodes once.
    ///
    /// Probes run concurrently, so a slow or failing node never delays the
    /// others beyond its own timeout.
    pub async fn check_all(&self) -> Vec<ProbeOutcome> {
        let nodes = match self.store.list_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                error!(error = %e, "Failed to list nodes for health check");
                return Vec::new();
            }
        };

        let probes = nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Worker)
            .map(|node| self.check_node(node));

        join_all(probes).await
    }

    async fn check_node(&self, node: &Node) -> ProbeOutcome {
        let started = Instant::now();
        let result = self.client.probe(node).await;
        let response_time = started.elapsed();

        let (status, error) = match result {
            Ok(()) => (HealthStatus::Healthy, None),
            Err(e) => {
                warn!(node = %node.id, error = %e, "Health probe failed");
                (HealthStatus::Unhealthy, Some(e.to_string()))
            }
        };

        if let Err(e) = self.store.set_node_health(&node.id, status).await {
            warn!(node = %node.id, error = %e, "Failed to record node health");
        }

        self.audit.record(
            AuditEvent::new(
                AuditAction::HealthCheck,
                node.id.as_str(),
                format!(
                    "end-node health check - status={} response_time={}ms",
                    status,
                    response_time.as_millis()
                ),
            )
            .with_node(node.id.clone()),
        );

        ProbeOutcome {
            node: node.id.clone(),
            status,
            response_time,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::testing::RecordingAuditSink;
    use crate::client::testing::FakeNodeClient;
    use crate::store::MemoryStore;

    async fn setup(names: &[&str]) -> (Arc<MemoryStore>, Arc<FakeNodeClient>, Arc<RecordingAuditSink>) {
        let store = Arc::new(MemoryStore::new());
        for name in names {
            store
                .upsert_node(Node::worker(NodeId::parse(*name).unwrap(), "10.0.0.1", 8080))
                .await
                .unwrap();
        }
        (
            store,
            Arc::new(FakeNodeClient::default()),
            Arc::new(RecordingAuditSink::default()),
        )
    }

    #[tokio::test]
    async fn test_failure_does_not_block_other_nodes() {
        let (store, client, audit) = setup(&["n1", "n2", "n3"]).await;
        client.set_down("n2");

        let monitor = HealthMonitor::new(
            store.clone(),
            client.clone(),
            audit.clone(),
            Duration::from_secs(30),
        );
        let outcomes = monitor.check_all().await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(client.probes.lock().unwrap().len(), 3);
        for outcome in &outcomes {
            let expected = if outcome.node.as_str() == "n2" {
                HealthStatus::Unhealthy
            } else {
                HealthStatus::Healthy
            };
            assert_eq!(outcome.status, expected);
        }

        let n3 = store
            .get_node(&NodeId::parse("n3").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n3.health, HealthStatus::Healthy);
        assert_eq!(audit.count(AuditAction::HealthCheck), 3);
    }

    #[tokio::test]
    async fn test_disabled_nodes_still_probed() {
        let (store, client, audit) = setup(&["n1"]).await;
        store
            .set_node_enabled(&NodeId::parse("n1").unwrap(), false)
            .await
            .unwrap();

        let monitor = HealthMonitor::new(store.clone(), client.clone(), audit, Duration::from_secs(30));
        monitor.check_all().await;

        let n1 = store
            .get_node(&NodeId::parse("n1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n1.health, HealthStatus::Healthy);
        assert!(!n1.enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_on_interval() {
        let (store, client, audit) = setup(&["n1"]).await;
        let monitor = Arc::new(HealthMonitor::new(
            store,
            client.clone(),
            audit,
            Duration::from_secs(30),
        ));
        let handle = tokio::spawn(monitor.run());

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(client.probes.lock().unwrap().len(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(client.probes.lock().unwrap().len(), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(client.probes.lock().unwrap().len(), 2);

        handle.abort();
    }
}
