//! Audit trail.
//!
//! The default sink writes one structured record per event on the `audit`
//! tracing target so it can be routed separately from operational logs.

use chrono::{DateTime, Utc};
use tracing::info;

use vpnfleet_core::NodeId;

/// Audited controller actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    EndnodeRegistered,
    EndnodeDeregistered,
    EndnodeRemoved,
    HealthCheck,
    UserCreated,
    UserDeleted,
    UserSynced,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EndnodeRegistered => "ENDNODE_REGISTERED",
            Self::EndnodeDeregistered => "ENDNODE_DEREGISTERED",
            Self::EndnodeRemoved => "ENDNODE_REMOVED",
            Self::HealthCheck => "HEALTH_CHECK",
            Self::UserCreated => "USER_CREATED",
            Self::UserDeleted => "USER_DELETED",
            Self::UserSynced => "USER_SYNCED",
        }
    }
}

/// A single audit record.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub action: AuditAction,
    /// User or node the action is about.
    pub subject: String,
    pub details: String,
    /// Node the action concerned, when there is one.
    pub node: Option<NodeId>,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, subject: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            action,
            subject: subject.into(),
            details: details.into(),
            node: None,
            at: Utc::now(),
        }
    }

    pub fn with_node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }
}

/// Destination for audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Emits audit records as tracing events.
pub struct TracingAuditSink {
    /// Controller name stamped on every record.
    server_id: String,
}

impl TracingAuditSink {
    pub fn new(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
        }
    }
}

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        info!(
            target: "audit",
            action = event.action.as_str(),
            subject = %event.subject,
            node = event.node.as_ref().map(|n| n.as_str()).unwrap_or(""),
            server_id = %self.server_id,
            at = %event.at.to_rfc3339(),
            "{}",
            event.details
        );
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Keeps every record in memory.
    #[derive(Default)]
    pub struct RecordingAuditSink {
        events: Mutex<Vec<AuditEvent>>,
    }

    impl RecordingAuditSink {
        pub fn events(&self) -> Vec<AuditEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn count(&self, action: AuditAction) -> usize {
            self.events().iter().filter(|e| e.action == action).count()
        }
    }

    impl AuditSink for RecordingAuditSink {
        fn record(&self, event: AuditEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}
