//! Calls from the controller to worker nodes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use vpnfleet_core::{Node, Username};
use vpnfleet_proto::{paths, ApiResponse, CreateProfileRequest, CreateProfileResult};

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
pub const CREATE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DELETE_TIMEOUT: Duration = Duration::from_secs(30);
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Node client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure or timeout.
    #[error("Node unreachable: {0}")]
    Unavailable(String),

    #[error("Node answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Not found on node")]
    NotFound,

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Unavailable(e.to_string())
        }
    }
}

/// Node Protocol operations the controller drives.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Liveness probe. Any transport error or non-2xx answer is a failure.
    async fn probe(&self, node: &Node) -> Result<(), ClientError>;

    async fn create_profile(
        &self,
        node: &Node,
        request: &CreateProfileRequest,
    ) -> Result<CreateProfileResult, ClientError>;

    /// Fails with `NotFound` when the node has no profile for the user.
    async fn delete_profile(&self, node: &Node, username: &Username) -> Result<(), ClientError>;

    /// `None` when the node has no profile for the user.
    async fn fetch_profile(
        &self,
        node: &Node,
        username: &Username,
    ) -> Result<Option<Vec<u8>>, ClientError>;
}

/// JSON/HTTP implementation of [`NodeClient`].
pub struct HttpNodeClient {
    http: reqwest::Client,
    api_key: String,
}

impl HttpNodeClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
        })
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }
}

async fn status_error(response: reqwest::Response) -> ClientError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ClientError::Status { status, body }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn probe(&self, node: &Node) -> Result<(), ClientError> {
        let url = format!("{}{}", node.base_url(), paths::HEALTH);
        let response = self.http.get(&url).timeout(PROBE_TIMEOUT).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }

    async fn create_profile(
        &self,
        node: &Node,
        request: &CreateProfileRequest,
    ) -> Result<CreateProfileResult, ClientError> {
        let url = format!("{}{}", node.base_url(), paths::CREATE_PROFILE);
        debug!(node = %node.id, username = %request.username, "Pushing profile");

        let response = self
            .authorized(self.http.post(&url))
            .json(request)
            .timeout(CREATE_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body: ApiResponse<CreateProfileResult> = response.json().await?;
        body.data
            .ok_or_else(|| ClientError::Decode("create response carried no data".to_string()))
    }

    async fn delete_profile(&self, node: &Node, username: &Username) -> Result<(), ClientError> {
        let url = format!(
            "{}{}",
            node.base_url(),
            paths::delete_profile(username.as_str())
        );

        let response = self
            .authorized(self.http.delete(&url))
            .timeout(DELETE_TIMEOUT)
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound),
            _ => Err(status_error(response).await),
        }
    }

    async fn fetch_profile(
        &self,
        node: &Node,
        username: &Username,
    ) -> Result<Option<Vec<u8>>, ClientError> {
        let url = format!(
            "{}{}",
            node.base_url(),
            paths::fetch_profile(username.as_str())
        );

        let response = self
            .authorized(self.http.get(&url))
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(Some(response.bytes().await?.to_vec())),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(status_error(response).await),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use super::*;
    use vpnfleet_core::NodeId;

    /// In-memory worker fleet.
    #[derive(Default)]
    pub struct FakeNodeClient {
        down: Mutex<HashSet<NodeId>>,
        profiles: Mutex<HashMap<(NodeId, String), Vec<u8>>>,
        pub probes: Mutex<Vec<NodeId>>,
        pub creates: Mutex<Vec<(NodeId, String)>>,
        pub deletes: Mutex<Vec<(NodeId, String)>>,
    }

    impl FakeNodeClient {
        pub fn set_down(&self, node: &str) {
            self.down
                .lock()
                .unwrap()
                .insert(NodeId::parse(node).unwrap());
        }

        pub fn set_up(&self, node: &str) {
            self.down
                .lock()
                .unwrap()
                .remove(&NodeId::parse(node).unwrap());
        }

        pub fn creates_for(&self, node: &str) -> Vec<String> {
            let mut names: Vec<String> = self
                .creates
                .lock()
                .unwrap()
                .iter()
                .filter(|(n, _)| n.as_str() == node)
                .map(|(_, u)| u.clone())
                .collect();
            names.sort();
            names
        }

        pub fn has_profile(&self, node: &str, username: &str) -> bool {
            self.profiles
                .lock()
                .unwrap()
                .contains_key(&(NodeId::parse(node).unwrap(), username.to_string()))
        }

        fn check_up(&self, node: &Node) -> Result<(), ClientError> {
            if self.down.lock().unwrap().contains(&node.id) {
                Err(ClientError::Unavailable(format!("{} is down", node.id)))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl NodeClient for FakeNodeClient {
        async fn probe(&self, node: &Node) -> Result<(), ClientError> {
            self.probes.lock().unwrap().push(node.id.clone());
            self.check_up(node)
        }

        async fn create_profile(
            &self,
            node: &Node,
            request: &CreateProfileRequest,
        ) -> Result<CreateProfileResult, ClientError> {
            self.creates
                .lock()
                .unwrap()
                .push((node.id.clone(), request.username.clone()));
            self.check_up(node)?;

            let body = format!("client\nproto {}\nport {}\n", request.protocol, request.port);
            self.profiles
                .lock()
                .unwrap()
                .insert((node.id.clone(), request.username.clone()), body.into_bytes());

            Ok(CreateProfileResult {
                username: request.username.clone(),
                path: format!("/etc/openvpn/clients/{}.ovpn", request.username),
                checksum: format!("sum-{}", request.username),
                used_fallback: false,
            })
        }

        async fn delete_profile(&self, node: &Node, username: &Username) -> Result<(), ClientError> {
            self.deletes
                .lock()
                .unwrap()
                .push((node.id.clone(), username.to_string()));
            self.check_up(node)?;
            self.profiles
                .lock()
                .unwrap()
                .remove(&(node.id.clone(), username.to_string()))
                .map(|_| ())
                .ok_or(ClientError::NotFound)
        }

        async fn fetch_profile(
            &self,
            node: &Node,
            username: &Username,
        ) -> Result<Option<Vec<u8>>, ClientError> {
            self.check_up(node)?;
            Ok(self
                .profiles
                .lock()
                .unwrap()
                .get(&(node.id.clone(), username.to_string()))
                .cloned())
        }
    }
}
