//! Main daemon command - starts the daemon server

use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::UnixListener;
use tokio::task::JoinSet;
use tower::Service;
use tracing::{debug, error, info, warn};

use vessel_daemon::config::Configuration;
use vessel_daemon::containers::ContainerManager;
use vessel_daemon::events::EventBus;
use vessel_daemon::exec::ExecManager;
use vessel_daemon::images::{backend::StubImageBackend, ImageManager};
use vessel_daemon::logstore::LogStore;
use vessel_daemon::networks::NetworkManager;
use vessel_daemon::ports::PortMapManager;
use vessel_daemon::router::{self, AppState};
use vessel_daemon::runtime::{StubBridgeController, StubVmRuntime};
use vessel_daemon::state::StateStore;
use vessel_daemon::volumes::VolumeManager;

/// Run the main daemon
pub async fn run(config_path: &str) -> Result<()> {
    info!("Loading configuration from: {}", config_path);
    let config = Configuration::load(config_path)?;
    let config = Arc::new(config);

    info!("Configuration loaded successfully");
    info!("  Socket: {}", config.socket.path.display());
    info!("  Data directory: {}", config.system.data_directory.display());

    let store = Arc::new(StateStore::open(config.system.state_db_path())?);
    let events = EventBus::new();
    let logs = Arc::new(LogStore::new(config.system.log_directory.clone()));

    let bridge = Arc::new(StubBridgeController::new());
    let networks = Arc::new(NetworkManager::new(store.clone(), bridge));
    networks
        .ensure_builtins()
        .await
        .context("failed to ensure builtin networks exist")?;

    let volumes = Arc::new(VolumeManager::new(store.clone(), config.system.volumes_directory.clone()));
    let ports = Arc::new(PortMapManager::new(store.clone()));
    let runtime = Arc::new(StubVmRuntime::new());
    let containers = ContainerManager::new(
        store.clone(),
        runtime,
        networks.clone(),
        volumes.clone(),
        ports.clone(),
        logs.clone(),
        events.clone(),
    );

    info!("Recovering container state from previous run...");
    containers.recover_on_boot().await?;

    let exec = Arc::new(ExecManager::new(containers.clone()));
    let image_backend = Arc::new(StubImageBackend::new());
    let images = Arc::new(ImageManager::new(image_backend, events.clone()));

    let live_ids: Vec<String> = containers.list(true)?.into_iter().map(|c| c.id).collect();
    exec.purge_for_missing_containers(&live_ids);

    let state = AppState {
        containers,
        networks,
        volumes,
        ports,
        images,
        exec,
        events,
        config: config.clone(),
    };
    let app = router::build_router(state);

    if config.socket.path.exists() {
        std::fs::remove_file(&config.socket.path)
            .with_context(|| format!("failed to remove stale socket at {}", config.socket.path.display()))?;
    }
    let listener = UnixListener::bind(&config.socket.path)
        .with_context(|| format!("failed to bind socket at {}", config.socket.path.display()))?;

    let mode = if config.socket.group_access { 0o660 } else { 0o600 };
    std::fs::set_permissions(&config.socket.path, std::fs::Permissions::from_mode(mode))?;
    info!("Listening on {}", config.socket.path.display());

    let shutdown_token = tokio_util::sync::CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install CTRL+C handler: {}", e);
            return;
        }
        warn!("received shutdown signal, draining connections...");
        signal_token.cancel();
    });

    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => {
                debug!("stopped accepting new connections");
                break;
            }
            accepted = listener.accept() => {
                let (socket, _) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("failed to accept connection: {}", e);
                        continue;
                    }
                };
                let tower_service = app.clone();
                connections.spawn(async move {
                    let socket = TokioIo::new(socket);
                    let hyper_service = hyper::service::service_fn(move |request| {
                        tower_service.clone().call(request)
                    });
                    if let Err(e) = auto::Builder::new(TokioExecutor::new())
                        .serve_connection_with_upgrades(socket, hyper_service)
                        .await
                    {
                        debug!("connection closed with error: {}", e);
                    }
                });
            }
        }
    }

    let drain = async {
        while connections.join_next().await.is_some() {}
    };
    if tokio::time::timeout(Duration::from_secs(10), drain).await.is_err() {
        warn!("timed out waiting for connections to drain, shutting down anyway");
        connections.shutdown().await;
    }

    let _ = std::fs::remove_file(&config.socket.path);
    info!("Daemon stopped");
    Ok(())
}
