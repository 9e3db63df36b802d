//! vpnfleet Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Filesystem or external processes
//! - Runtime specifics
//!
//! Everything the controller and the workers agree on lives here.

pub mod cert;
pub mod error;
pub mod ids;
pub mod node;
pub mod status;
pub mod user;

// Re-export commonly used types
pub use cert::CertificateBundle;
pub use error::CoreError;
pub use ids::{NodeId, Username};
pub use node::Node;
pub use status::{HealthStatus, NodeKind, Protocol};
pub use user::{validate_port, User, DEFAULT_CLIENT_PORT};
