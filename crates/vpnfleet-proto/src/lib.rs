//! Node Protocol shared by the vpnfleet controller and workers.
//!
//! This crate contains:
//! - JSON request/response bodies for both directions
//! - Endpoint paths and axum route patterns
//! - Converters between wire types and domain types
//! - API-key header extraction

pub mod auth;
pub mod convert;
pub mod paths;
pub mod wire;

// Re-export commonly used types
pub use auth::{extract_api_key, key_matches, AUTHORIZATION, X_API_KEY};
pub use convert::ProfileParams;
pub use wire::{
    ApiResponse, CertData, CreateProfileRequest, CreateProfileResult, ErrorBody,
    HealthResponse, HeartbeatRequest, RegisterRequest,
};

/// Content type of downloadable client profiles.
pub const PROFILE_CONTENT_TYPE: &str = "application/x-openvpn-profile";
