//! On-disk profile storage.
//!
//! Profiles live at `<dir>/<username>.ovpn`. Writes go to the configured
//! directory, or to a fixed fallback when it is not writable; lookups check
//! both.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use vpnfleet_core::Username;

/// Fixed alternate directory used when the configured one is not writable.
pub const FALLBACK_CLIENTS_DIR: &str = "/opt/vpnmanager/clients";

const WRITE_PROBE: &str = ".write_test";

#[derive(Debug, Clone)]
pub struct ProfileStore {
    primary: PathBuf,
    fallback: PathBuf,
}

impl ProfileStore {
    pub fn new(primary: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            fallback: PathBuf::from(FALLBACK_CLIENTS_DIR),
        }
    }

    /// Override the fallback directory.
    pub fn with_fallback(mut self, fallback: impl Into<PathBuf>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// Directory new profiles are written to.
    ///
    /// Creates the primary directory if needed and probes it with a scratch
    /// file; any failure switches silently to the fallback.
    pub async fn writable_dir(&self) -> std::io::Result<PathBuf> {
        match probe_writable(&self.primary).await {
            Ok(()) => Ok(self.primary.clone()),
            Err(e) => {
                warn!(
                    dir = %self.primary.display(),
                    fallback = %self.fallback.display(),
                    error = %e,
                    "Clients directory not writable, using fallback"
                );
                create_dir(&self.fallback).await?;
                Ok(self.fallback.clone())
            }
        }
    }

    pub fn profile_path(dir: &Path, username: &Username) -> PathBuf {
        dir.join(format!("{}.ovpn", username))
    }

    /// Existing profile path, primary directory first.
    pub async fn locate(&self, username: &Username) -> Option<PathBuf> {
        for dir in [&self.primary, &self.fallback] {
            let path = Self::profile_path(dir, username);
            if tokio::fs::metadata(&path).await.is_ok() {
                return Some(path);
            }
        }
        None
    }

    /// Every existing copy of the profile, primary directory first.
    pub async fn locate_all(&self, username: &Username) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for dir in [&self.primary, &self.fallback] {
            let path = Self::profile_path(dir, username);
            if tokio::fs::metadata(&path).await.is_ok() && !found.contains(&path) {
                found.push(path);
            }
        }
        found
    }

    /// Profile bytes, `None` when no profile exists.
    pub async fn read(&self, username: &Username) -> std::io::Result<Option<Vec<u8>>> {
        let Some(path) = self.locate(username).await else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remove a profile. Returns false if it was already gone.
    pub async fn remove(&self, path: &Path) -> std::io::Result<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed profile");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

async fn create_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o755)).await?;
    }
    Ok(())
}

async fn probe_writable(dir: &Path) -> std::io::Result<()> {
    create_dir(dir).await?;
    let probe = dir.join(WRITE_PROBE);
    tokio::fs::write(&probe, b"test").await?;
    tokio::fs::remove_file(&probe).await
}
