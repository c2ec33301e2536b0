//! Stratum Control Plane
//!
//! Plans the multi-tier VM topology for a target scale, keeps the inventory
//! and its derived DNS and flow records, and drives the ordered deployment
//! pipeline through the automation engine.

use std::sync::Arc;

use anyhow::{Context, Result};
use stratum_control_plane::{
    api,
    config,
    db::Store,
    deploy::{builtin_registry, CommandEngine, PipelineJobs, Sequencer, VaultBootstrap},
    state::AppState,
    topology::{Planner, Topology},
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to STRATUM_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting stratum control plane");
    info!(listen_addr = %config.listen_addr, db_path = %config.db_path.display(), "Configuration loaded");

    let store = match Store::open(&config.db_path) {
        Ok(store) => {
            info!("Store opened");
            store
        }
        Err(e) => {
            error!(error = %e, "Failed to open store");
            return Err(e.into());
        }
    };

    // Seed settings, zones and shared services
    let topology_file = config.topology()?;
    let settings = store.seed_settings(&config.defaults)?;
    store.seed_zones(&topology_file.zones)?;
    if !topology_file.shared_services.is_empty() {
        store.replace_shared_services(&topology_file.shared_services)?;
    }

    let topology = Topology::new(store.clone(), Planner::new(topology_file.sizing_table()?));
    if store.list_vms(None)?.is_empty() {
        match topology.apply_scale(settings.scale) {
            Ok(report) => info!(scale = report.scale, vms = report.vms.len(), "Initial topology materialized"),
            Err(e) => warn!(scale = settings.scale, error = %e, "Initial topology not materialized"),
        }
    } else {
        topology.refresh_derived()?;
    }

    // Deployment pipeline
    let registry = builtin_registry(VaultBootstrap::new()?);
    for unit in &config.units {
        if !registry.contains(unit) {
            warn!(unit = %unit, "Configured unit has no resolver and will fail when reached");
        }
    }

    std::fs::create_dir_all(&config.workdir)
        .with_context(|| format!("failed to create workdir {}", config.workdir.display()))?;
    let engine = CommandEngine::new(config.engine.command.clone(), config.engine.args.clone());
    let sequencer = Sequencer::new(
        store.clone(),
        Arc::new(registry),
        Arc::new(engine),
        config.workdir.clone(),
    )
    .with_workers(config.engine.workers);
    let jobs = Arc::new(PipelineJobs::new(sequencer, config.units.clone()));

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create application state
    let state = AppState::new(store, topology, jobs);

    // Build and run the server
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    // Spawn the server with graceful shutdown
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    // Wait for shutdown signal (Ctrl+C)
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(true);

    info!("Control plane shutdown complete");
    Ok(())
}
