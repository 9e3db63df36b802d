//! JSON bodies of the Node Protocol.

use chrono::Utc;
use serde::{Deserialize, Serialize};

// ============================================================================
// Worker -> controller
// ============================================================================

/// Registration sent by a worker at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub server_id: String,
    pub host: String,
    pub port: u16,
    pub status: String,
}

/// Periodic liveness report from a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub server_id: String,
    pub status: String,
    /// Unix seconds.
    pub timestamp: i64,
    /// Milliseconds, when the worker measured one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
}

impl HeartbeatRequest {
    pub fn healthy(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            status: "healthy".to_string(),
            timestamp: Utc::now().timestamp(),
            response_time: None,
        }
    }
}

// ============================================================================
// Controller -> worker
// ============================================================================

/// Liveness answer of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
    pub version: String,
    pub server_id: String,
}

impl HealthResponse {
    pub fn healthy(server_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now().timestamp(),
            version: version.into(),
            server_id: server_id.into(),
        }
    }
}

/// Certificate blocks on the wire. Only used by the worker as a fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertData {
    #[serde(default)]
    pub ca: String,
    #[serde(default)]
    pub cert: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub ta: String,
}

/// Body of `POST /api/ovpn/create`.
///
/// Fields stay loosely typed so validation can report which one is wrong
/// instead of failing JSON decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProfileRequest {
    pub username: String,
    pub port: i64,
    pub protocol: String,
    pub server_id: String,
    pub server_ip: String,
    #[serde(default)]
    pub cert_data: CertData,
}

/// Result of a successful profile creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProfileResult {
    pub username: String,
    pub path: String,
    /// SHA-256 hex of the rendered profile.
    pub checksum: String,
    /// True when the caller-supplied bundle was embedded.
    pub used_fallback: bool,
}

// ============================================================================
// Envelopes
// ============================================================================

/// Standard success envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    // A missing field decodes as `None` without a `T: Default` bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub timestamp: i64,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            timestamp: Utc::now().timestamp(),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            timestamp: Utc::now().timestamp(),
        }
    }
}

/// Error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_decodes_wire_body() {
        let json = r#"{
            "username": "bob",
            "port": 1195,
            "protocol": "tcp",
            "server_id": "w1",
            "server_ip": "10.0.0.5",
            "cert_data": {"ca": "a", "cert": "b", "key": "c", "ta": "d"}
        }"#;
        let req: CreateProfileRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.port, 1195);
        assert_eq!(req.cert_data.ta, "d");
    }

    #[test]
    fn test_heartbeat_response_time_optional() {
        let hb: HeartbeatRequest =
            serde_json::from_str(r#"{"server_id":"w1","status":"healthy","timestamp":1}"#)
                .unwrap();
        assert_eq!(hb.response_time, None);

        let json = serde_json::to_string(&hb).unwrap();
        assert!(!json.contains("response_time"));
    }

    #[test]
    fn test_message_envelope_omits_data() {
        let json = serde_json::to_value(ApiResponse::message("done")).unwrap();
        assert_eq!(json["success"], true);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_envelope_decodes_with_and_without_data() {
        let bare: ApiResponse<CreateProfileResult> =
            serde_json::from_str(r#"{"success":true,"message":"m","timestamp":1}"#).unwrap();
        assert_eq!(bare.data, None);

        let full: ApiResponse<CreateProfileResult> = serde_json::from_str(
            r#"{
                "success": true,
                "message": "created",
                "data": {
                    "username": "bob",
                    "path": "/etc/openvpn/clients/bob.ovpn",
                    "checksum": "abc",
                    "used_fallback": false
                },
                "timestamp": 1
            }"#,
        )
        .unwrap();
        let data = full.data.unwrap();
        assert_eq!(data.username, "bob");
        assert!(!data.used_fallback);
    }
}
