//! Certificate & profile pipeline.
//!
//! Issues a client certificate through the PKI driver, renders the profile
//! and persists it. PKI failures never fail the request: the caller-supplied
//! bundle is embedded instead.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};
use vpnfleet_core::CertificateBundle;
use vpnfleet_proto::ProfileParams;

use crate::pki::{PkiDriver, PkiError};
use crate::profile::{checksum, render_profile};
use crate::store::ProfileStore;

/// Pause between the two post-write checks.
pub const VERIFY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("profile storage: {0}")]
    Storage(#[from] std::io::Error),

    #[error("profile {0} disappeared after write")]
    Vanished(PathBuf),
}

/// A persisted profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    pub path: PathBuf,
    /// SHA-256 hex of the written bytes.
    pub checksum: String,
    /// True when the caller's bundle was embedded instead of PKI output.
    pub used_fallback: bool,
}

pub struct ProvisionPipeline {
    pki: Arc<dyn PkiDriver>,
    store: ProfileStore,
    verify_delay: Duration,
}

impl ProvisionPipeline {
    pub fn new(pki: Arc<dyn PkiDriver>, store: ProfileStore) -> Self {
        Self {
            pki,
            store,
            verify_delay: VERIFY_DELAY,
        }
    }

    pub fn with_verify_delay(mut self, delay: Duration) -> Self {
        self.verify_delay = delay;
        self
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    /// Issue, render and persist the profile for `params.username`.
    pub async fn provision(
        &self,
        params: &ProfileParams,
        fallback: &CertificateBundle,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let dir = self.store.writable_dir().await?;
        let path = ProfileStore::profile_path(&dir, &params.username);

        let (bundle, used_fallback) = match self.issue(params).await {
            Ok(bundle) => (bundle, false),
            Err(e) => {
                warn!(
                    username = %params.username,
                    error = %e,
                    "PKI issuance failed, embedding provided certificates"
                );
                (fallback.clone(), true)
            }
        };

        let content = render_profile(params, &bundle);
        write_profile(&path, content.as_bytes()).await?;

        // A concurrent delete may race the write; only the second check counts.
        if tokio::fs::metadata(&path).await.is_err() {
            warn!(path = %path.display(), "Profile not visible right after write");
        }
        tokio::time::sleep(self.verify_delay).await;
        if tokio::fs::metadata(&path).await.is_err() {
            return Err(ProvisionError::Vanished(path));
        }

        let checksum = checksum(content.as_bytes());
        info!(
            username = %params.username,
            path = %path.display(),
            protocol = %params.protocol,
            port = params.port,
            used_fallback,
            "Profile created"
        );

        Ok(ProvisionOutcome {
            path,
            checksum,
            used_fallback,
        })
    }

    async fn issue(&self, params: &ProfileParams) -> Result<CertificateBundle, PkiError> {
        self.pki.issue_request(&params.username).await?;
        self.pki.sign(&params.username).await?;

        let bundle = self.pki.read_artifacts(&params.username).await;
        if !bundle.is_complete() {
            warn!(
                username = %params.username,
                missing = ?bundle.missing_blocks(),
                "PKI artifacts missing, leaving blocks blank"
            );
        }
        Ok(bundle)
    }
}

async fn write_profile(path: &std::path::Path, content: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(path, content).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)).await?;
    }
    Ok(())
}
