//! Converters between wire types and domain types.

use crate::wire::{CertData, CreateProfileRequest};
use vpnfleet_core::{
    validate_port, CertificateBundle, CoreError, NodeId, Protocol, User, Username,
};

// ============================================================================
// Certificate conversions
// ============================================================================

impl From<CertificateBundle> for CertData {
    fn from(bundle: CertificateBundle) -> Self {
        Self {
            ca: bundle.ca,
            cert: bundle.cert,
            key: bundle.key,
            ta: bundle.ta,
        }
    }
}

impl From<CertData> for CertificateBundle {
    fn from(data: CertData) -> Self {
        CertificateBundle::new(data.ca, data.cert, data.key, data.ta)
    }
}

// ============================================================================
// Create-profile conversions
// ============================================================================

/// Validated parameters of a profile to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileParams {
    pub username: Username,
    pub port: u16,
    pub protocol: Protocol,
    pub server_id: NodeId,
    pub server_ip: String,
}

impl CreateProfileRequest {
    /// Build the request the controller sends for a user.
    pub fn for_user(user: &User, server_ip: impl Into<String>, bundle: CertificateBundle) -> Self {
        Self {
            username: user.username.to_string(),
            port: i64::from(user.port),
            protocol: user.protocol.to_string(),
            server_id: user.node_id.to_string(),
            server_ip: server_ip.into(),
            cert_data: bundle.into(),
        }
    }

    /// Validate every field, returning the render parameters and the
    /// caller's fallback bundle.
    pub fn validate(self) -> Result<(ProfileParams, CertificateBundle), CoreError> {
        let username = Username::parse(self.username)?;
        let port = validate_port(self.port)?;
        let protocol: Protocol = self.protocol.parse()?;
        let server_id = NodeId::parse(self.server_id)?;

        let server_ip = self.server_ip.trim().to_string();
        if server_ip.is_empty() {
            return Err(CoreError::InvalidInput("server_ip is required".to_string()));
        }

        let bundle = CertificateBundle::from(self.cert_data);
        if let Err(block) = bundle.validate_framing() {
            return Err(CoreError::InvalidInput(format!(
                "invalid {} certificate format",
                block
            )));
        }

        Ok((
            ProfileParams {
                username,
                port,
                protocol,
                server_id,
                server_ip,
            },
            bundle,
        ))
    }
}
