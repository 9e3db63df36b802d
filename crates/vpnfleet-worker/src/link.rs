//! Link to the controller: registration, heartbeats, deregistration.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use vpnfleet_proto::{paths, HeartbeatRequest, RegisterRequest};

pub const MAX_REGISTRATION_ATTEMPTS: u32 = 3;
pub const REGISTRATION_BACKOFF_STEP: Duration = Duration::from_secs(5);

const REGISTER_TIMEOUT: Duration = Duration::from_secs(10);
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("controller unreachable: {0}")]
    Unavailable(#[from] reqwest::Error),

    #[error("controller returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Calls the worker makes on the controller.
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn register(&self, request: &RegisterRequest) -> Result<(), RegistrationError>;

    async fn heartbeat(&self, request: &HeartbeatRequest) -> Result<(), RegistrationError>;

    async fn deregister(&self, server_id: &str) -> Result<(), RegistrationError>;
}

/// Registrar over the controller's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpRegistrar {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpRegistrar {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, RegistrationError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }
}

async fn expect_ok(resp: reqwest::Response) -> Result<(), RegistrationError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(RegistrationError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl Registrar for HttpRegistrar {
    async fn register(&self, request: &RegisterRequest) -> Result<(), RegistrationError> {
        let req = self
            .http
            .post(self.url(paths::REGISTER))
            .timeout(REGISTER_TIMEOUT)
            .json(request);
        let resp = self.authorized(req).send().await?;
        expect_ok(resp).await
    }

    async fn heartbeat(&self, request: &HeartbeatRequest) -> Result<(), RegistrationError> {
        // Heartbeats are unauthenticated on the controller side.
        let resp = self
            .http
            .post(self.url(&paths::heartbeat(&request.server_id)))
            .timeout(HEARTBEAT_TIMEOUT)
            .json(request)
            .send()
            .await?;
        expect_ok(resp).await
    }

    async fn deregister(&self, server_id: &str) -> Result<(), RegistrationError> {
        let req = self
            .http
            .post(self.url(&paths::deregister(server_id)))
            .timeout(REGISTER_TIMEOUT);
        let resp = self.authorized(req).send().await?;
        expect_ok(resp).await
    }
}

/// Register with up to [`MAX_REGISTRATION_ATTEMPTS`] attempts, sleeping
/// `attempt × 5s` between them. Returns whether any attempt succeeded.
pub async fn register_with_retry(registrar: &dyn Registrar, request: &RegisterRequest) -> bool {
    for attempt in 1..=MAX_REGISTRATION_ATTEMPTS {
        match registrar.register(request).await {
            Ok(()) => {
                info!(
                    server_id = %request.server_id,
                    host = %request.host,
                    port = request.port,
                    attempt,
                    "Registered with controller"
                );
                return true;
            }
            Err(e) => {
                warn!(attempt, max = MAX_REGISTRATION_ATTEMPTS, error = %e, "Registration failed");
                if attempt < MAX_REGISTRATION_ATTEMPTS {
                    tokio::time::sleep(REGISTRATION_BACKOFF_STEP * attempt).await;
                }
            }
        }
    }

    error!(
        server_id = %request.server_id,
        "Giving up on registration, worker keeps serving unregistered"
    );
    false
}

/// Send a heartbeat every `interval` until the task is aborted.
pub async fn run_heartbeats(registrar: Arc<dyn Registrar>, server_id: String, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Registration already announced us.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match registrar
            .heartbeat(&HeartbeatRequest::healthy(server_id.clone()))
            .await
        {
            Ok(()) => debug!(server_id = %server_id, "Heartbeat sent"),
            Err(e) => warn!(server_id = %server_id, error = %e, "Heartbeat failed"),
        }
    }
}

/// Address of the interface used for outbound traffic, else loopback.
///
/// Connecting a UDP socket sends nothing; it only selects a route.
pub fn detect_local_ip() -> IpAddr {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use tokio::time::Instant;

    use super::*;

    /// Registrar that fails the first `failures` registrations.
    pub struct FakeRegistrar {
        failures: u32,
        attempts: AtomicU32,
        pub attempt_times: Mutex<Vec<Instant>>,
        pub heartbeats: Mutex<Vec<HeartbeatRequest>>,
        pub deregistered: Mutex<Vec<String>>,
    }

    impl FakeRegistrar {
        pub fn failing(failures: u32) -> Self {
            Self {
                failures,
                attempts: AtomicU32::new(0),
                attempt_times: Mutex::new(Vec::new()),
                heartbeats: Mutex::new(Vec::new()),
                deregistered: Mutex::new(Vec::new()),
            }
        }

        pub fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Registrar for FakeRegistrar {
        async fn register(&self, _request: &RegisterRequest) -> Result<(), RegistrationError> {
            self.attempt_times.lock().unwrap().push(Instant::now());
            let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                return Err(RegistrationError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(())
        }

        async fn heartbeat(&self, request: &HeartbeatRequest) -> Result<(), RegistrationError> {
            self.heartbeats.lock().unwrap().push(request.clone());
            Ok(())
        }

        async fn deregister(&self, server_id: &str) -> Result<(), RegistrationError> {
            self.deregistered.lock().unwrap().push(server_id.to_string());
            Ok(())
        }
    }
}
