//! Status and kind enums for fleet nodes and VPN transport.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// Role of a node in the fleet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// The central coordinator.
    Controller,
    /// A VPN gateway machine running a daemon instance.
    #[default]
    Worker,
}

/// Last known liveness of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Never probed.
    #[default]
    Unknown,
    /// Last probe answered with a 2xx status.
    Healthy,
    /// Last probe failed or answered non-2xx.
    Unhealthy,
}

impl HealthStatus {
    /// Lowercase wire/label form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        }
    }

    /// Map a free-form status string reported by a worker.
    ///
    /// Workers report `active` on registration and `healthy` on heartbeats;
    /// anything else counts as unhealthy.
    pub fn from_reported(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "healthy" | "active" | "ok" | "online" => Self::Healthy,
            "" | "unknown" => Self::Unknown,
            _ => Self::Unhealthy,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// VPN transport protocol written into client profiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Udp,
    Tcp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "udp" => Ok(Self::Udp),
            "tcp" => Ok(Self::Tcp),
            other => Err(CoreError::InvalidProtocol(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parse() {
        assert_eq!("udp".parse::<Protocol>().unwrap(), Protocol::Udp);
        assert_eq!("tcp".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert!(matches!(
            "sctp".parse::<Protocol>(),
            Err(CoreError::InvalidProtocol(_))
        ));
        assert!("TCP".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_protocol_serde_lowercase() {
        let json = serde_json::to_string(&Protocol::Tcp).unwrap();
        assert_eq!(json, "\"tcp\"");
        assert!(serde_json::from_str::<Protocol>("\"icmp\"").is_err());
    }

    #[test]
    fn test_health_from_reported() {
        assert_eq!(HealthStatus::from_reported("active"), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_reported("Healthy"), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_reported("degraded"), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::from_reported(""), HealthStatus::Unknown);
    }
}
