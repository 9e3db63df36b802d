//! Core domain errors.

use thiserror::Error;

/// Validation errors raised before any side effect happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Username failed the length/charset/path checks.
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    /// Username collides with a reserved system or PKI name.
    #[error("Username '{0}' is reserved")]
    ReservedUsername(String),

    /// Node identifier is empty, too long or malformed.
    #[error("Invalid server id: {0}")]
    InvalidNodeId(String),

    /// Port outside 1..=65535.
    #[error("Port must be between 1 and 65535, got {0}")]
    InvalidPort(i64),

    /// Transport protocol other than udp/tcp.
    #[error("Protocol must be 'udp' or 'tcp', got '{0}'")]
    InvalidProtocol(String),

    /// Any other malformed input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
