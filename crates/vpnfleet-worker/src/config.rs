//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_SERVER_ID: &str = "endnode-server";
pub const DEFAULT_CLIENTS_DIR: &str = "/opt/vpnmanager/clients";
pub const DEFAULT_EASYRSA_DIR: &str = "/opt/vpnmanager/easyrsa";
pub const DEFAULT_OPENVPN_DIR: &str = "/etc/openvpn";
pub const DEFAULT_DISCONNECT_SCRIPT: &str = "/opt/vpnmanager/scripts/disconnect-user.sh";
pub const DEFAULT_RATE_LIMIT_MAX: u32 = 100;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Worker configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "vpnfleet-worker", version, about = "vpnfleet VPN gateway worker")]
pub struct Config {
    /// HTTP bind address.
    #[arg(long, env = "BIND_ADDR", default_value = DEFAULT_BIND_ADDR)]
    pub bind_addr: String,

    /// Unique name of this node in the fleet.
    #[arg(long, env = "ENDNODE_SERVER_ID", default_value = DEFAULT_SERVER_ID)]
    pub server_id: String,

    /// Controller base URL. Empty runs the worker standalone.
    #[arg(long, env = "MANAGEMENT_URL", default_value = "")]
    pub management_url: String,

    /// Shared key for both directions. Empty disables the check.
    #[arg(long, env = "API_KEY", default_value = "", hide_env_values = true)]
    pub api_key: String,

    /// Address advertised to the controller. Detected when unset.
    #[arg(long, env = "ENDNODE_HOST")]
    pub advertise_host: Option<String>,

    /// Where client profiles are written.
    #[arg(long, env = "CLIENTS_DIR", default_value = DEFAULT_CLIENTS_DIR)]
    pub clients_dir: PathBuf,

    /// easy-rsa installation (binary and `pki/`).
    #[arg(long, env = "EASYRSA_DIR", default_value = DEFAULT_EASYRSA_DIR)]
    pub easyrsa_dir: PathBuf,

    /// OpenVPN configuration directory (CRL and tls-crypt key).
    #[arg(long, env = "OPENVPN_DIR", default_value = DEFAULT_OPENVPN_DIR)]
    pub openvpn_dir: PathBuf,

    /// OpenVPN management socket. The first existing well-known path when unset.
    #[arg(long, env = "OPENVPN_MANAGEMENT_SOCKET")]
    pub management_socket: Option<PathBuf>,

    /// Script run when the management socket cannot disconnect a user.
    #[arg(long, env = "DISCONNECT_SCRIPT", default_value = DEFAULT_DISCONNECT_SCRIPT)]
    pub disconnect_script: PathBuf,

    /// Requests allowed per caller address per window.
    #[arg(long, env = "RATE_LIMIT_MAX", default_value_t = DEFAULT_RATE_LIMIT_MAX)]
    pub rate_limit_max: u32,

    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value_t = DEFAULT_RATE_LIMIT_WINDOW_SECS)]
    pub rate_limit_window_secs: u64,

    /// Seconds between heartbeats to the controller.
    #[arg(long, env = "HEARTBEAT_INTERVAL_SECS", default_value_t = HEARTBEAT_INTERVAL_SECS)]
    pub heartbeat_interval_secs: u64,
}

impl Config {
    /// Port the HTTP server listens on, advertised at registration.
    pub fn listen_port(&self) -> u16 {
        self.bind_addr
            .parse::<SocketAddr>()
            .map(|a| a.port())
            .unwrap_or(8080)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs.max(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Shared tls-crypt key embedded in every profile.
    pub fn tls_crypt_key(&self) -> PathBuf {
        self.openvpn_dir.join("tls-crypt.key")
    }

    pub fn has_controller(&self) -> bool {
        !self.management_url.trim().is_empty()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            server_id: DEFAULT_SERVER_ID.to_string(),
            management_url: String::new(),
            api_key: String::new(),
            advertise_host: None,
            clients_dir: PathBuf::from(DEFAULT_CLIENTS_DIR),
            easyrsa_dir: PathBuf::from(DEFAULT_EASYRSA_DIR),
            openvpn_dir: PathBuf::from(DEFAULT_OPENVPN_DIR),
            management_socket: None,
            disconnect_script: PathBuf::from(DEFAULT_DISCONNECT_SCRIPT),
            rate_limit_max: DEFAULT_RATE_LIMIT_MAX,
            rate_limit_window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            heartbeat_interval_secs: HEARTBEAT_INTERVAL_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.listen_port(), 8080);
        assert_eq!(config.rate_limit_window(), Duration::from_secs(60));
        assert_eq!(config.tls_crypt_key(), PathBuf::from("/etc/openvpn/tls-crypt.key"));
        assert!(!config.has_controller());
    }

    #[test]
    fn test_parse_flags() {
        let config = Config::parse_from([
            "vpnfleet-worker",
            "--server-id",
            "w1",
            "--bind-addr",
            "0.0.0.0:9090",
            "--management-url",
            "http://10.0.0.1:8080",
            "--rate-limit-max",
            "5",
        ]);
        assert_eq!(config.server_id, "w1");
        assert_eq!(config.listen_port(), 9090);
        assert!(config.has_controller());
        assert_eq!(config.rate_limit_max, 5);
    }
}
