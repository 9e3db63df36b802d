//! vpnfleet Worker Daemon

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vpnfleet_proto::RegisterRequest;
use vpnfleet_worker::link::{self, HttpRegistrar, Registrar};
use vpnfleet_worker::pki::{EasyRsa, PkiDriver};
use vpnfleet_worker::ratelimit::{MemoryRateLimiter, RateLimiter};
use vpnfleet_worker::store::ProfileStore;
use vpnfleet_worker::vpn::{self, OpenVpn, VpnControl};
use vpnfleet_worker::{http, AppState, Config, ProvisionPipeline, RevocationPipeline};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load config
    let config = Config::parse();
    let http_addr: SocketAddr = config.bind_addr.parse()?;

    if config.api_key.is_empty() {
        warn!("API_KEY not set - profile endpoints are open");
    }

    // Create shared components
    let pki: Arc<dyn PkiDriver> = Arc::new(EasyRsa::new(
        config.easyrsa_dir.clone(),
        config.tls_crypt_key(),
    ));

    let socket = vpn::resolve_socket(config.management_socket.as_deref());
    match &socket {
        Some(path) => info!(socket = %path.display(), "Using OpenVPN management socket"),
        None => warn!("No OpenVPN management socket found, sessions are dropped via script only"),
    }
    let vpn: Arc<dyn VpnControl> = Arc::new(OpenVpn::new(socket, config.disconnect_script.clone()));

    let profiles = ProfileStore::new(config.clients_dir.clone());
    let provision = ProvisionPipeline::new(pki.clone(), profiles.clone());
    let revocation = RevocationPipeline::new(pki, vpn, profiles, config.openvpn_dir.clone());
    let limiter: Arc<dyn RateLimiter> = Arc::new(MemoryRateLimiter::new(
        config.rate_limit_max,
        config.rate_limit_window(),
    ));

    let state = AppState::new(
        provision,
        revocation,
        limiter,
        config.api_key.clone(),
        config.server_id.clone(),
    );

    // Controller link
    let registrar: Option<Arc<dyn Registrar>> = if config.has_controller() {
        Some(Arc::new(HttpRegistrar::new(
            config.management_url.clone(),
            config.api_key.clone(),
        )?))
    } else {
        info!("MANAGEMENT_URL not set, running standalone");
        None
    };

    let link_task = registrar.clone().map(|registrar| {
        let host = config
            .advertise_host
            .clone()
            .unwrap_or_else(|| link::detect_local_ip().to_string());
        let request = RegisterRequest {
            server_id: config.server_id.clone(),
            host,
            port: config.listen_port(),
            status: "online".to_string(),
        };
        let interval = config.heartbeat_interval();

        tokio::spawn(async move {
            link::register_with_retry(registrar.as_ref(), &request).await;
            link::run_heartbeats(registrar, request.server_id, interval).await;
        })
    });

    // Start HTTP server
    let http_router = http::create_router(state);
    let listener = TcpListener::bind(http_addr).await?;

    info!(
        http_addr = %http_addr,
        server_id = %config.server_id,
        clients_dir = %config.clients_dir.display(),
        easyrsa_dir = %config.easyrsa_dir.display(),
        rate_limit_max = config.rate_limit_max,
        "Starting vpnfleet worker"
    );

    axum::serve(
        listener,
        http_router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Stop heartbeats, then leave the fleet
    if let Some(task) = link_task {
        task.abort();
    }
    if let Some(registrar) = registrar {
        match registrar.deregister(&config.server_id).await {
            Ok(()) => info!(server_id = %config.server_id, "Deregistered from controller"),
            Err(e) => warn!(error = %e, "Deregistration failed"),
        }
    }
    info!("Worker stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
