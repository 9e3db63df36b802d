//! PKI driver.
//!
//! Certificates are issued, signed and revoked by shelling out to easy-rsa in
//! batch mode. The rest of the worker only sees the [`PkiDriver`] trait.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};
use vpnfleet_core::{CertificateBundle, Username};

/// Errors from the PKI driver.
#[derive(Debug, Error)]
pub enum PkiError {
    /// The easy-rsa directory or its `pki/` is missing.
    #[error("PKI unavailable: {0}")]
    Unavailable(String),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with status {code:?}: {output}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },
}

/// Certificate authority operations used by the pipelines.
#[async_trait]
pub trait PkiDriver: Send + Sync {
    /// Create a key pair and signing request for the user, no passphrase.
    async fn issue_request(&self, username: &Username) -> Result<(), PkiError>;

    /// Sign the user's request as a client certificate.
    async fn sign(&self, username: &Username) -> Result<(), PkiError>;

    /// Revoke the user's certificate and purge its issued cert, key and request.
    async fn revoke(&self, username: &Username) -> Result<(), PkiError>;

    /// Regenerate the CRL. Returns the path of the fresh `crl.pem`.
    async fn regenerate_crl(&self) -> Result<PathBuf, PkiError>;

    /// Read CA, client cert, client key and shared tls-crypt key.
    ///
    /// Unreadable blocks come back blank.
    async fn read_artifacts(&self, username: &Username) -> CertificateBundle;
}

/// easy-rsa in batch mode.
#[derive(Debug, Clone)]
pub struct EasyRsa {
    dir: PathBuf,
    pki_dir: PathBuf,
    tls_crypt_key: PathBuf,
}

impl EasyRsa {
    pub fn new(dir: impl Into<PathBuf>, tls_crypt_key: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let pki_dir = dir.join("pki");
        Self {
            dir,
            pki_dir,
            tls_crypt_key: tls_crypt_key.into(),
        }
    }

    pub fn pki_dir(&self) -> &Path {
        &self.pki_dir
    }

    fn ensure_available(&self) -> Result<(), PkiError> {
        if !self.dir.is_dir() {
            return Err(PkiError::Unavailable(format!(
                "easy-rsa directory {} not found",
                self.dir.display()
            )));
        }
        if !self.pki_dir.is_dir() {
            return Err(PkiError::Unavailable(format!(
                "PKI directory {} not found",
                self.pki_dir.display()
            )));
        }
        Ok(())
    }

    async fn easyrsa(&self, args: &[&str]) -> Result<(), PkiError> {
        self.ensure_available()?;

        let program = self.dir.join("easyrsa");
        let command = format!("easyrsa {}", args.join(" "));
        debug!(command = %command, "Running easy-rsa");

        let mut cmd = Command::new(&program);
        cmd.args(args)
            .env_clear()
            .env("PATH", std::env::var_os("PATH").unwrap_or_default())
            .env("EASYRSA_BATCH", "1")
            .env("EASYRSA_PKI", &self.pki_dir)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = cmd.output().await.map_err(|source| PkiError::Spawn {
            program: program.display().to_string(),
            source,
        })?;

        if !output.status.success() {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(PkiError::CommandFailed {
                command,
                code: output.status.code(),
                output: text.trim().to_string(),
            });
        }
        Ok(())
    }

    /// Issued certificate re-encoded as bare PEM (drops easy-rsa's text dump).
    async fn canonical_cert(&self, username: &Username) -> Option<String> {
        let path = self
            .pki_dir
            .join("issued")
            .join(format!("{}.crt", username));

        let output = Command::new("openssl")
            .arg("x509")
            .arg("-in")
            .arg(&path)
            .arg("-outform")
            .arg("PEM")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => {
                Some(String::from_utf8_lossy(&out.stdout).trim().to_string())
            }
            Ok(out) => {
                warn!(path = %path.display(), code = ?out.status.code(), "openssl x509 failed");
                read_block(&path).await
            }
            Err(e) => {
                warn!(error = %e, "openssl not runnable, reading certificate as-is");
                read_block(&path).await
            }
        }
    }
}

#[async_trait]
impl PkiDriver for EasyRsa {
    async fn issue_request(&self, username: &Username) -> Result<(), PkiError> {
        self.easyrsa(&["gen-req", username.as_str(), "nopass"]).await?;
        info!(username = %username, "Generated certificate request");
        Ok(())
    }

    async fn sign(&self, username: &Username) -> Result<(), PkiError> {
        self.easyrsa(&["sign-req", "client", username.as_str()])
            .await?;
        info!(username = %username, "Signed client certificate");
        Ok(())
    }

    async fn revoke(&self, username: &Username) -> Result<(), PkiError> {
        let result = self.easyrsa(&["revoke", username.as_str()]).await;

        // Purge even when revoke failed so the name can be re-issued.
        for path in [
            self.pki_dir.join("issued").join(format!("{}.crt", username)),
            self.pki_dir.join("private").join(format!("{}.key", username)),
            self.pki_dir.join("reqs").join(format!("{}.req", username)),
        ] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Removed PKI file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove PKI file"),
            }
        }

        result?;
        info!(username = %username, "Revoked certificate");
        Ok(())
    }

    async fn regenerate_crl(&self) -> Result<PathBuf, PkiError> {
        self.easyrsa(&["gen-crl"]).await?;
        Ok(self.pki_dir.join("crl.pem"))
    }

    async fn read_artifacts(&self, username: &Username) -> CertificateBundle {
        let ca = read_block(&self.pki_dir.join("ca.crt")).await;
        let cert = self.canonical_cert(username).await;
        let key = read_block(
            &self
                .pki_dir
                .join("private")
                .join(format!("{}.key", username)),
        )
        .await;
        let ta = read_block(&self.tls_crypt_key).await;

        CertificateBundle::new(
            ca.unwrap_or_default(),
            cert.unwrap_or_default(),
            key.unwrap_or_default(),
            ta.unwrap_or_default(),
        )
    }
}

async fn read_block(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Some(content.trim().to_string()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read PKI artifact");
            None
        }
    }
}
