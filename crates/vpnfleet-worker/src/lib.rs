//! vpnfleet Worker Library
//!
//! Everything a VPN gateway runs:
//! - PKI driver (easy-rsa) and VPN control channel (OpenVPN management socket)
//! - Certificate & profile pipeline, revocation & disconnect pipeline
//! - Controller link (registration, heartbeats, deregistration)
//! - The HTTP surface the controller and VPN clients call

pub mod config;
pub mod http;
pub mod link;
pub mod locks;
pub mod pki;
pub mod profile;
pub mod provision;
pub mod ratelimit;
pub mod revoke;
pub mod state;
pub mod store;
pub mod vpn;

pub use config::Config;
pub use provision::ProvisionPipeline;
pub use revoke::RevocationPipeline;
pub use state::AppState;
