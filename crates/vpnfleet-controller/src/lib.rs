//! vpnfleet Controller Library
//!
//! This crate provides the fleet coordination side of vpnfleet: node
//! registry and selection, health monitoring, user sync, and the HTTP
//! surface workers and operators talk to.

pub mod audit;
pub mod client;
pub mod config;
pub mod health;
pub mod http;
pub mod metrics;
pub mod selector;
pub mod service;
pub mod state;
pub mod store;
pub mod sync;

pub use config::Config;
pub use selector::NodeSelector;
pub use service::FleetService;
pub use state::AppState;
