//! Controller configuration.

use std::time::Duration;

use clap::Parser;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_SERVER_ID: &str = "management-server";
pub const HEALTH_INTERVAL_SECS: u64 = 30;
pub const SYNC_INTERVAL_SECS: u64 = 60;

/// Controller configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "vpnfleet-controller", version, about = "vpnfleet fleet controller")]
pub struct Config {
    /// HTTP bind address.
    #[arg(long, env = "BIND_ADDR", default_value = DEFAULT_BIND_ADDR)]
    pub bind_addr: String,

    /// Name of this controller in audit records.
    #[arg(long, env = "MANAGEMENT_SERVER_ID", default_value = DEFAULT_SERVER_ID)]
    pub server_id: String,

    /// Key required on registration and operator endpoints. Empty disables the check.
    #[arg(long, env = "API_KEY", default_value = "", hide_env_values = true)]
    pub api_key: String,

    /// Key presented to workers.
    #[arg(long, env = "ENDNODE_API_KEY", default_value = "", hide_env_values = true)]
    pub worker_api_key: String,

    /// Seconds between health probe rounds.
    #[arg(long, env = "HEALTH_INTERVAL_SECS", default_value_t = HEALTH_INTERVAL_SECS)]
    pub health_interval_secs: u64,

    /// Seconds between user sync rounds.
    #[arg(long, env = "SYNC_INTERVAL_SECS", default_value_t = SYNC_INTERVAL_SECS)]
    pub sync_interval_secs: u64,
}

impl Config {
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs.max(1))
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            server_id: DEFAULT_SERVER_ID.to_string(),
            api_key: String::new(),
            worker_api_key: String::new(),
            health_interval_secs: HEALTH_INTERVAL_SECS,
            sync_interval_secs: SYNC_INTERVAL_SECS,
        }
    }
}
