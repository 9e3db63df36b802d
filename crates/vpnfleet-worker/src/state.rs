//! Shared application state.

use std::sync::Arc;

use crate::locks::UserLocks;
use crate::provision::ProvisionPipeline;
use crate::ratelimit::RateLimiter;
use crate::revoke::RevocationPipeline;
use crate::store::ProfileStore;

/// Shared application state.
pub struct AppState {
    pub provision: ProvisionPipeline,
    pub revocation: RevocationPipeline,
    pub profiles: ProfileStore,
    pub locks: UserLocks,
    pub limiter: Arc<dyn RateLimiter>,

    /// Key required on every endpoint except `/health`. Empty disables
    /// the check.
    pub api_key: String,

    /// Node name reported on `/health`.
    pub server_id: String,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    pub fn new(
        provision: ProvisionPipeline,
        revocation: RevocationPipeline,
        limiter: Arc<dyn RateLimiter>,
        api_key: impl Into<String>,
        server_id: impl Into<String>,
    ) -> Arc<Self> {
        let profiles = provision.store().clone();
        Arc::new(Self {
            provision,
            revocation,
            profiles,
            locks: UserLocks::new(),
            limiter,
            api_key: api_key.into(),
            server_id: server_id.into(),
        })
    }
}
