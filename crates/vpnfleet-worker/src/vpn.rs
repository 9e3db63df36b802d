//! VPN daemon control.
//!
//! Talks to OpenVPN over its management socket, signals it to reload the
//! CRL, and falls back to an operator script to drop a session.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use vpnfleet_core::Username;

/// Well-known management socket locations, tried in order.
pub const MANAGEMENT_SOCKETS: [&str; 3] = [
    "/var/run/openvpn/server.sock",
    "/var/run/openvpn-server/server.sock",
    "/run/openvpn/server.sock",
];

const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum VpnError {
    #[error("no management socket available")]
    NoSocket,

    #[error("management socket I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("management socket timed out")]
    Timeout,

    #[error("management interface replied: {0}")]
    Rejected(String),

    #[error("{command} exited with status {code:?}")]
    CommandFailed { command: String, code: Option<i32> },
}

/// How a kill request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// The management interface confirmed the kill.
    Killed,
    /// The disconnect script ran successfully.
    ScriptInvoked,
    /// Neither path worked; the session may still be up.
    NotDisconnected,
}

/// Operations on the running VPN daemon.
#[async_trait]
pub trait VpnControl: Send + Sync {
    /// Make the daemon re-read its CRL.
    async fn reload_revocation_list(&self) -> Result<(), VpnError>;

    /// Terminate every live session of the user.
    async fn kill_session(&self, username: &Username) -> KillOutcome;

    /// Common names of the connected clients.
    async fn status(&self) -> Result<Vec<String>, VpnError>;
}

/// OpenVPN driven through its management interface.
#[derive(Debug, Clone)]
pub struct OpenVpn {
    socket: Option<PathBuf>,
    disconnect_script: PathBuf,
}

impl OpenVpn {
    /// `socket` is the already-resolved management socket, see [`resolve_socket`].
    pub fn new(socket: Option<PathBuf>, disconnect_script: impl Into<PathBuf>) -> Self {
        Self {
            socket,
            disconnect_script: disconnect_script.into(),
        }
    }

    async fn manage(&self, command: &str) -> Result<String, VpnError> {
        let path = self.socket.as_deref().ok_or(VpnError::NoSocket)?;
        debug!(socket = %path.display(), command = %command, "Management command");
        timeout(SOCKET_TIMEOUT, send_command(path, command))
            .await
            .map_err(|_| VpnError::Timeout)?
    }

    async fn run_script(&self, username: &Username) -> Result<(), VpnError> {
        if !self.disconnect_script.is_file() {
            return Err(VpnError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", self.disconnect_script.display()),
            )));
        }

        let status = Command::new(&self.disconnect_script)
            .arg(username.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        if !status.success() {
            return Err(VpnError::CommandFailed {
                command: self.disconnect_script.display().to_string(),
                code: status.code(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VpnControl for OpenVpn {
    async fn reload_revocation_list(&self) -> Result<(), VpnError> {
        let status = Command::new("pkill")
            .args(["-USR1", "-x", "openvpn"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        if !status.success() {
            return Err(VpnError::CommandFailed {
                command: "pkill -USR1 -x openvpn".to_string(),
                code: status.code(),
            });
        }
        Ok(())
    }

    async fn kill_session(&self, username: &Username) -> KillOutcome {
        match self.manage(&format!("kill {}", username)).await {
            Ok(reply) if is_kill_success(&reply) => {
                info!(username = %username, "Session killed via management socket");
                return KillOutcome::Killed;
            }
            Ok(reply) => {
                warn!(username = %username, reply = %reply.trim(), "Management kill not confirmed");
            }
            Err(e) => {
                warn!(username = %username, error = %e, "Management kill failed");
            }
        }

        match self.run_script(username).await {
            Ok(()) => {
                info!(username = %username, "Disconnect script invoked");
                KillOutcome::ScriptInvoked
            }
            Err(e) => {
                warn!(username = %username, error = %e, "Disconnect script failed");
                KillOutcome::NotDisconnected
            }
        }
    }

    async fn status(&self) -> Result<Vec<String>, VpnError> {
        let reply = self.manage("status").await?;
        Ok(parse_status_clients(&reply))
    }
}

/// The configured socket if set, else the first well-known one that exists.
pub fn resolve_socket(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        return Some(path.to_path_buf());
    }
    MANAGEMENT_SOCKETS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

/// Send one command and collect the reply.
///
/// The banner line is skipped. Replies end at a `SUCCESS:`/`ERROR:` line
/// (single-line commands) or at `END` (multi-line commands like `status`).
async fn send_command(path: &Path, command: &str) -> Result<String, VpnError> {
    let stream = UnixStream::connect(path).await?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut line = String::new();
    // Banner: ">INFO:OpenVPN Management Interface ..."
    reader.read_line(&mut line).await?;

    write_half
        .write_all(format!("{}\n", command).as_bytes())
        .await?;

    let mut reply = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        // Real-time notifications can interleave with replies.
        if line.starts_with('>') {
            continue;
        }
        reply.push_str(&line);
        let trimmed = line.trim_end();
        if trimmed.starts_with("SUCCESS:") || trimmed == "END" {
            break;
        }
        if trimmed.starts_with("ERROR:") {
            return Err(VpnError::Rejected(trimmed.to_string()));
        }
    }

    write_half.write_all(b"quit\n").await.ok();
    Ok(reply)
}

fn is_kill_success(reply: &str) -> bool {
    reply.contains("SUCCESS") || reply.contains("killed")
}

/// Extract client common names from a `status` reply (v1, v2 and v3 formats).
pub fn parse_status_clients(reply: &str) -> Vec<String> {
    let mut clients = Vec::new();
    let mut in_v1_list = false;

    for line in reply.lines() {
        let line = line.trim();

        if let Some(rest) = line
            .strip_prefix("CLIENT_LIST,")
            .or_else(|| line.strip_prefix("CLIENT_LIST\t"))
        {
            if let Some(name) = rest.split([',', '\t']).next() {
                if !name.is_empty() {
                    clients.push(name.to_string());
                }
            }
            continue;
        }

        if line.starts_with("Common Name,") {
            in_v1_list = true;
            continue;
        }
        if line == "ROUTING TABLE" || line == "GLOBAL STATS" || line == "END" {
            in_v1_list = false;
            continue;
        }
        if in_v1_list {
            if let Some(name) = line.split(',').next() {
                if !name.is_empty() {
                    clients.push(name.to_string());
                }
            }
        }
    }

    clients
}
