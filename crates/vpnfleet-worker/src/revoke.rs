//! Revocation & disconnect pipeline.
//!
//! Removing the profile file is the operation of record. Every later step
//! (revoke, CRL, reload, kill, status check) is attempted and logged but
//! cannot fail the request; the CRL enforces revocation at the next
//! authentication even if the live session survives.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};
use vpnfleet_core::Username;

use crate::pki::PkiDriver;
use crate::store::ProfileStore;
use crate::vpn::{KillOutcome, VpnControl};

/// Delay before re-checking the daemon's client list.
pub const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum RevokeError {
    #[error("no profile for user {0}")]
    NotFound(String),

    #[error("failed to remove profile: {0}")]
    Storage(#[from] std::io::Error),
}

/// What each teardown step achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationReport {
    /// Every profile copy that was deleted.
    pub removed: Vec<PathBuf>,
    pub revoked: bool,
    pub crl_deployed: bool,
    pub reloaded: bool,
    pub kill: KillOutcome,
    /// `None` when the daemon status could not be read.
    pub still_connected: Option<bool>,
}

pub struct RevocationPipeline {
    pki: Arc<dyn PkiDriver>,
    vpn: Arc<dyn VpnControl>,
    store: ProfileStore,
    openvpn_dir: PathBuf,
    grace: Duration,
}

impl RevocationPipeline {
    pub fn new(
        pki: Arc<dyn PkiDriver>,
        vpn: Arc<dyn VpnControl>,
        store: ProfileStore,
        openvpn_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pki,
            vpn,
            store,
            openvpn_dir: openvpn_dir.into(),
            grace: DISCONNECT_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub async fn revoke(&self, username: &Username) -> Result<RevocationReport, RevokeError> {
        let candidates = self.store.locate_all(username).await;
        if candidates.is_empty() {
            return Err(RevokeError::NotFound(username.to_string()));
        }

        // A copy may sit in both the primary and the fallback directory.
        let mut removed = Vec::with_capacity(candidates.len());
        for path in candidates {
            if self.store.remove(&path).await? {
                info!(username = %username, path = %path.display(), "Profile deleted");
                removed.push(path);
            }
        }
        if removed.is_empty() {
            return Err(RevokeError::NotFound(username.to_string()));
        }

        let revoked = match self.pki.revoke(username).await {
            Ok(()) => true,
            Err(e) => {
                warn!(username = %username, error = %e, "Certificate revocation failed");
                false
            }
        };

        let crl_deployed = match self.pki.regenerate_crl().await {
            Ok(crl) => match deploy_crl(&crl, &self.openvpn_dir).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(crl = %crl.display(), error = %e, "Failed to deploy CRL");
                    false
                }
            },
            Err(e) => {
                warn!(error = %e, "CRL regeneration failed");
                false
            }
        };

        let reloaded = match self.vpn.reload_revocation_list().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to signal VPN daemon reload");
                false
            }
        };

        let kill = self.vpn.kill_session(username).await;
        if kill == KillOutcome::NotDisconnected {
            warn!(
                username = %username,
                "Could not disconnect live session, CRL applies at next authentication"
            );
        }

        tokio::time::sleep(self.grace).await;
        let still_connected = match self.vpn.status().await {
            Ok(clients) => {
                let present = clients.iter().any(|c| c == username.as_str());
                if present {
                    warn!(username = %username, "User still listed as connected");
                }
                Some(present)
            }
            Err(e) => {
                warn!(error = %e, "Could not read VPN status");
                None
            }
        };

        info!(
            username = %username,
            revoked,
            crl_deployed,
            reloaded,
            kill = ?kill,
            "User revoked"
        );

        Ok(RevocationReport {
            removed,
            revoked,
            crl_deployed,
            reloaded,
            kill,
            still_connected,
        })
    }
}

/// Copy the CRL into the daemon's directory, world-readable, owned by root.
async fn deploy_crl(crl: &Path, openvpn_dir: &Path) -> std::io::Result<()> {
    let target = openvpn_dir.join("crl.pem");
    tokio::fs::copy(crl, &target).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o644)).await?;
        if let Err(e) = std::os::unix::fs::chown(&target, Some(0), Some(0)) {
            warn!(path = %target.display(), error = %e, "Failed to chown CRL to root");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pki::testing::FakePki;
    use crate::vpn::testing::FakeVpn;

    struct Fixture {
        tmp: tempfile::TempDir,
        clients: PathBuf,
        pki: Arc<FakePki>,
        vpn: Arc<FakeVpn>,
        pipeline: RevocationPipeline,
    }

    fn fixture(pki: FakePki, vpn: FakeVpn) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let clients = tmp.path().join("clients");
        std::fs::create_dir_all(&clients).unwrap();
        let pki = Arc::new(pki);
        let vpn = Arc::new(vpn);
        let store = ProfileStore::new(&clients).with_fallback(tmp.path().join("fallback"));
        let pipeline = RevocationPipeline::new(pki.clone(), vpn.clone(), store, tmp.path())
            .with_grace(Duration::ZERO);
        Fixture {
            tmp,
            clients,
            pki,
            vpn,
            pipeline,
        }
    }

    fn user(name: &str) -> Username {
        Username::parse(name).unwrap()
    }

    #[tokio::test]
    async fn test_missing_profile_is_not_found_without_side_effects() {
        let f = fixture(FakePki::new(), FakeVpn::new());

        let err = f.pipeline.revoke(&user("carol")).await.unwrap_err();
        assert!(matches!(err, RevokeError::NotFound(u) if u == "carol"));
        assert_eq!(f.pki.call_count(), 0);
        assert_eq!(*f.vpn.reloads.lock().unwrap(), 0);
        assert!(f.vpn.kills.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_teardown() {
        let f = fixture(FakePki::new(), FakeVpn::new());
        let path = f.clients.join("alice.ovpn");
        std::fs::write(&path, "client\n").unwrap();
        f.vpn.connect("alice");

        let report = f.pipeline.revoke(&user("alice")).await.unwrap();
        assert!(!path.exists());
        assert!(report.revoked);
        assert!(report.reloaded);
        assert_eq!(report.kill, KillOutcome::Killed);
        assert_eq!(report.still_connected, Some(false));
        assert_eq!(
            *f.pki.calls.lock().unwrap(),
            vec!["revoke alice".to_string(), "gen-crl".to_string()]
        );
        // The fake CRL path does not exist, so deployment fails but is tolerated.
        assert!(!report.crl_deployed);
    }

    #[tokio::test]
    async fn test_profile_removed_even_when_everything_downstream_fails() {
        let f = fixture(
            FakePki::failing(),
            FakeVpn::with_outcome(KillOutcome::NotDisconnected),
        );
        let path = f.clients.join("dave.ovpn");
        std::fs::write(&path, "client\n").unwrap();
        f.vpn.connect("dave");

        let report = f.pipeline.revoke(&user("dave")).await.unwrap();
        assert!(!path.exists());
        assert!(!report.revoked);
        assert!(!report.crl_deployed);
        assert_eq!(report.kill, KillOutcome::NotDisconnected);
        assert_eq!(report.still_connected, Some(true));
    }

    #[tokio::test]
    async fn test_copies_in_both_directories_are_removed() {
        let f = fixture(FakePki::new(), FakeVpn::new());
        let fallback = f.tmp.path().join("fallback");
        std::fs::create_dir_all(&fallback).unwrap();
        std::fs::write(f.clients.join("alice.ovpn"), "primary\n").unwrap();
        std::fs::write(fallback.join("alice.ovpn"), "fallback\n").unwrap();

        let report = f.pipeline.revoke(&user("alice")).await.unwrap();
        assert_eq!(
            report.removed,
            vec![f.clients.join("alice.ovpn"), fallback.join("alice.ovpn")]
        );
        assert!(!f.clients.join("alice.ovpn").exists());
        assert!(!fallback.join("alice.ovpn").exists());
        assert_eq!(f.pipeline.store.read(&user("alice")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_revoke_failure_still_regenerates_crl() {
        let pki = FakePki::new();
        pki.set_fail_revoke();
        let f = fixture(pki, FakeVpn::new());
        std::fs::write(f.clients.join("erin.ovpn"), "client\n").unwrap();

        let report = f.pipeline.revoke(&user("erin")).await.unwrap();
        assert!(!report.revoked);
        assert_eq!(f.pki.call_count(), 2);
        assert_eq!(f.pki.revoked(), 0);
    }

    #[tokio::test]
    async fn test_deploy_crl_copies_file() {
        let tmp = tempfile::tempdir().unwrap();
        let crl = tmp.path().join("source.pem");
        let target_dir = tmp.path().join("openvpn");
        std::fs::create_dir_all(&target_dir).unwrap();
        std::fs::write(&crl, "-----BEGIN X509 CRL-----\n").unwrap();

        deploy_crl(&crl, &target_dir).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(target_dir.join("crl.pem")).unwrap(),
            "-----BEGIN X509 CRL-----\n"
        );
    }
}
