//! Shared application state.

use std::sync::Arc;

use crate::service::FleetService;

/// Shared application state.
pub struct AppState {
    pub service: FleetService,

    /// Key required on registration and operator endpoints. Empty disables
    /// the check.
    pub api_key: String,

    /// Controller name reported on `/health`.
    pub server_id: String,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    pub fn new(service: FleetService, api_key: impl Into<String>, server_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            service,
            api_key: api_key.into(),
            server_id: server_id.into(),
        })
    }
}
