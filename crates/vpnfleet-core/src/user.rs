//! VPN user records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CoreError, NodeId, Protocol, Username};

/// Port written into profiles when the caller does not pick one.
pub const DEFAULT_CLIENT_PORT: u16 = 1194;

/// A VPN user and its canonical node assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: Username,

    /// The single node the user is primarily assigned to.
    pub node_id: NodeId,

    pub port: u16,
    pub protocol: Protocol,
    pub active: bool,

    /// True once a push to the assigned node has succeeded.
    pub synced: bool,

    /// Fingerprint of the last profile the assigned node reported.
    pub checksum: Option<String>,

    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create an active, not-yet-synced user.
    pub fn new(
        username: Username,
        node_id: NodeId,
        port: u16,
        protocol: Protocol,
        created_by: impl Into<String>,
    ) -> Result<Self, CoreError> {
        if port == 0 {
            return Err(CoreError::InvalidPort(0));
        }

        Ok(Self {
            username,
            node_id,
            port,
            protocol,
            active: true,
            synced: false,
            checksum: None,
            created_by: created_by.into(),
            created_at: Utc::now(),
        })
    }
}

/// Validate a port received as a wider integer.
pub fn validate_port(port: i64) -> Result<u16, CoreError> {
    match u16::try_from(port) {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(CoreError::InvalidPort(port)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_unsynced() {
        let user = User::new(
            Username::parse("alice").unwrap(),
            NodeId::parse("w1").unwrap(),
            DEFAULT_CLIENT_PORT,
            Protocol::Udp,
            "operator",
        )
        .unwrap();
        assert!(user.active);
        assert!(!user.synced);
        assert!(user.checksum.is_none());
    }

    #[test]
    fn test_port_validation() {
        assert_eq!(validate_port(1).unwrap(), 1);
        assert_eq!(validate_port(65535).unwrap(), 65535);
        assert!(validate_port(0).is_err());
        assert!(validate_port(65536).is_err());
        assert!(validate_port(-1).is_err());
    }
}
