//! Node selector - picks the worker a user is placed on.

use std::cmp::Reverse;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use vpnfleet_core::{Node, NodeId};

use crate::store::{Store, StoreError};

/// Users a node is assumed to hold at full load.
pub const NODE_CAPACITY: usize = 50;

/// A preferred node is kept while its load stays under this fraction.
pub const PREFERRED_LOAD_LIMIT: f64 = 0.80;

/// Nodes at or above this many active users are not recommended.
pub const RECOMMENDATION_USER_LIMIT: usize = 40;

pub const MAX_RECOMMENDATIONS: usize = 3;

/// Selector errors.
#[derive(Debug, Error)]
pub enum SelectorError {
    #[error("No available node")]
    NoAvailableNode,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An enabled worker and its active user count.
#[derive(Debug, Clone)]
pub struct NodeLoad {
    pub node: Node,
    pub active_users: usize,
}

impl NodeLoad {
    pub fn load(&self) -> f64 {
        self.active_users as f64 / NODE_CAPACITY as f64
    }
}

/// Choose a node from `loads`.
///
/// The preferred node wins while its load is under the limit; otherwise the
/// node with the fewest users, newest first on ties.
pub fn pick<'a>(loads: &'a [NodeLoad], preferred: Option<&NodeId>) -> Option<&'a Node> {
    if let Some(preferred) = preferred {
        if let Some(candidate) = loads.iter().find(|l| &l.node.id == preferred) {
            if candidate.load() < PREFERRED_LOAD_LIMIT {
                return Some(&candidate.node);
            }
        }
    }

    loads
        .iter()
        .min_by_key(|l| (l.active_users, Reverse(l.node.created_at)))
        .map(|l| &l.node)
}

/// Other lightly loaded nodes, least loaded first.
pub fn recommend(loads: &[NodeLoad], selected: &NodeId) -> Vec<Node> {
    let mut candidates: Vec<&NodeLoad> = loads
        .iter()
        .filter(|l| &l.node.id != selected && l.active_users < RECOMMENDATION_USER_LIMIT)
        .collect();
    candidates.sort_by_key(|l| (l.active_users, Reverse(l.node.created_at)));
    candidates
        .into_iter()
        .take(MAX_RECOMMENDATIONS)
        .map(|l| l.node.clone())
        .collect()
}

/// Load-aware node selection over the store.
pub struct NodeSelector {
    store: Arc<dyn Store>,
}

impl NodeSelector {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Enabled workers with their active user counts.
    pub async fn loads(&self) -> Result<Vec<NodeLoad>, StoreError> {
        let nodes = self.store.list_enabled_workers().await?;
        let counts = self.store.active_user_counts().await?;

        Ok(nodes
            .into_iter()
            .map(|node| {
                let active_users = counts.get(&node.id).copied().unwrap_or(0);
                NodeLoad { node, active_users }
            })
            .collect())
    }

    /// Select a node, honouring `preferred` while it has headroom.
    pub async fn select(&self, preferred: Option<&NodeId>) -> Result<Node, SelectorError> {
        let loads = self.loads().await?;
        let node = pick(&loads, preferred)
            .cloned()
            .ok_or(SelectorError::NoAvailableNode)?;

        debug!(
            node = %node.id,
            preferred = preferred.map(|p| p.as_str()).unwrap_or(""),
            "Selected node"
        );
        Ok(node)
    }

    /// Best-effort alternatives to `selected`. Store failures yield an empty list.
    pub async fn recommendations(&self, selected: &NodeId) -> Vec<Node> {
        match self.loads().await {
            Ok(loads) => recommend(&loads, selected),
            Err(e) => {
                warn!(error = %e, "Failed to load node recommendations");
                Vec::new()
            }
        }
    }
}
