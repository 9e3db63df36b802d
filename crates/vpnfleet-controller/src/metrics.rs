//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;

use vpnfleet_core::HealthStatus;

use crate::store::Store;

/// Collect fleet metrics and format as Prometheus text.
pub async fn collect_metrics(store: &dyn Store) -> String {
    let mut output = String::new();

    collect_node_metrics(store, &mut output).await;
    collect_user_metrics(store, &mut output).await;

    output
}

/// Collect node metrics by health.
async fn collect_node_metrics(store: &dyn Store, output: &mut String) {
    let nodes = store.list_nodes().await.unwrap_or_default();

    let mut healthy = 0u64;
    let mut unhealthy = 0u64;
    let mut unknown = 0u64;
    let mut disabled = 0u64;

    for node in &nodes {
        match node.health {
            HealthStatus::Healthy => healthy += 1,
            HealthStatus::Unhealthy => unhealthy += 1,
            HealthStatus::Unknown => unknown += 1,
        }
        if !node.enabled {
            disabled += 1;
        }
    }

    writeln!(output, "# HELP vpnfleet_nodes Number of registered nodes by health").ok();
    writeln!(output, "# TYPE vpnfleet_nodes gauge").ok();
    writeln!(output, "vpnfleet_nodes{{health=\"healthy\"}} {healthy}").ok();
    writeln!(output, "vpnfleet_nodes{{health=\"unhealthy\"}} {unhealthy}").ok();
    writeln!(output, "vpnfleet_nodes{{health=\"unknown\"}} {unknown}").ok();

    writeln!(output, "# HELP vpnfleet_nodes_disabled Number of registered nodes that are disabled").ok();
    writeln!(output, "# TYPE vpnfleet_nodes_disabled gauge").ok();
    writeln!(output, "vpnfleet_nodes_disabled {disabled}").ok();
}

/// Collect user metrics by sync state.
async fn collect_user_metrics(store: &dyn Store, output: &mut String) {
    let users = store.list_users().await.unwrap_or_default();

    let synced = users.iter().filter(|u| u.synced).count();
    let unsynced = users.len() - synced;

    writeln!(output, "# HELP vpnfleet_users Number of users by sync state").ok();
    writeln!(output, "# TYPE vpnfleet_users gauge").ok();
    writeln!(output, "vpnfleet_users{{synced=\"true\"}} {synced}").ok();
    writeln!(output, "vpnfleet_users{{synced=\"false\"}} {unsynced}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use vpnfleet_core::{Node, NodeId, Protocol, User, Username};

    #[tokio::test]
    async fn test_metrics_format() {
        let store = MemoryStore::new();
        let mut node = Node::worker(NodeId::parse("w1").unwrap(), "10.0.0.1", 8080);
        node.health = HealthStatus::Healthy;
        store.upsert_node(node).await.unwrap();
        store
            .upsert_node(Node::worker(NodeId::parse("w2").unwrap(), "10.0.0.2", 8080))
            .await
            .unwrap();

        let mut alice = User::new(
            Username::parse("alice").unwrap(),
            NodeId::parse("w1").unwrap(),
            1194,
            Protocol::Udp,
            "test",
        )
        .unwrap();
        alice.synced = true;
        store.upsert_user(alice).await.unwrap();

        let text = collect_metrics(&store).await;
        assert!(text.contains("vpnfleet_nodes{health=\"healthy\"} 1"));
        assert!(text.contains("vpnfleet_nodes{health=\"unknown\"} 1"));
        assert!(text.contains("vpnfleet_users{synced=\"true\"} 1"));
        assert!(text.contains("vpnfleet_users{synced=\"false\"} 0"));
        assert!(text.contains("# TYPE vpnfleet_nodes gauge"));
    }
}
