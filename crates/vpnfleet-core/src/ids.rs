//! Newtype wrappers for identifiers to ensure type safety.
//!
//! Both identifiers end up in filesystem paths and external command
//! arguments, so they can only be built through their validating
//! constructors.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::CoreError;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 32;
const NODE_ID_MAX: usize = 64;

/// Names that would collide with system accounts or easy-rsa's own
/// artifacts (`ca.crt`, `server.crt`, `ta.key`, `dh.pem`).
const RESERVED_USERNAMES: &[&str] = &[
    "admin",
    "root",
    "system",
    "vpnmanager",
    "postgres",
    "nobody",
    "ca",
    "server",
    "ta",
    "dh",
];

/// A validated VPN username.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Validate and wrap a username.
    pub fn parse(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();

        if raw.len() < USERNAME_MIN || raw.len() > USERNAME_MAX {
            return Err(CoreError::InvalidUsername(format!(
                "must be {}-{} characters",
                USERNAME_MIN, USERNAME_MAX
            )));
        }

        if raw.contains("..") || raw.contains('/') || raw.contains('\\') {
            return Err(CoreError::InvalidUsername(
                "contains path traversal characters".to_string(),
            ));
        }

        if let Some(c) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
        {
            return Err(CoreError::InvalidUsername(format!(
                "invalid character {:?}, only letters, digits and '_' are allowed",
                c
            )));
        }

        if RESERVED_USERNAMES
            .iter()
            .any(|r| r.eq_ignore_ascii_case(&raw))
        {
            return Err(CoreError::ReservedUsername(raw));
        }

        Ok(Self(raw))
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Username {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<Username> for String {
    fn from(u: Username) -> Self {
        u.0
    }
}

/// Unique identifier (name) of a fleet node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    /// Validate and wrap a node identifier.
    pub fn parse(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();

        if raw.is_empty() || raw.len() > NODE_ID_MAX {
            return Err(CoreError::InvalidNodeId(format!(
                "must be 1-{} characters",
                NODE_ID_MAX
            )));
        }

        if raw
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '/' || c == '\\')
        {
            return Err(CoreError::InvalidNodeId(format!(
                "'{}' contains whitespace or path separators",
                raw
            )));
        }

        Ok(Self(raw))
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for NodeId {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}
