//! vpnfleet Controller Server

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vpnfleet_controller::audit::{AuditSink, TracingAuditSink};
use vpnfleet_controller::client::{HttpNodeClient, NodeClient};
use vpnfleet_controller::health::HealthMonitor;
use vpnfleet_controller::store::{MemoryStore, Store};
use vpnfleet_controller::sync::SyncCoordinator;
use vpnfleet_controller::{http, AppState, Config, FleetService};

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
        tracing::warn!("API_KEY not set - registration and operator endpoints are open");
    }

    // Create shared components
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let client: Arc<dyn NodeClient> = Arc::new(HttpNodeClient::new(config.worker_api_key.clone())?);
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink::new(config.server_id.clone()));

    let sync = Arc::new(SyncCoordinator::new(
        store.clone(),
        client.clone(),
        audit.clone(),
        config.sync_interval(),
    ));
    let monitor = Arc::new(HealthMonitor::new(
        store.clone(),
        client.clone(),
        audit.clone(),
        config.health_interval(),
    ));

    let service = FleetService::new(store, client, audit, sync.clone());
    let state = AppState::new(service, config.api_key.clone(), config.server_id.clone());

    // Start periodic loops
    let health_task = tokio::spawn(monitor.run());
    let sync_task = tokio::spawn(sync.run());

    // Start HTTP server
    let http_router = http::create_router(state);
    let listener = TcpListener::bind(http_addr).await?;

    info!(
        http_addr = %http_addr,
        server_id = %config.server_id,
        health_interval_secs = config.health_interval_secs,
        sync_interval_secs = config.sync_interval_secs,
        "Starting vpnfleet controller"
    );

    axum::serve(listener, http_router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop future ticks
    health_task.abort();
    sync_task.abort();
    info!("Controller stopped");

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
