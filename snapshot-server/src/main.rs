mod auth;
mod error;
mod handlers;
mod models;
mod router;
mod state;

use std::sync::Arc;

use snapshot_core::{spawn_refresh_worker, BroadcastHub, HttpSource, ServiceConfig, SnapshotCache};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::router::create_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ServiceConfig::load();
    info!(
        owner = %config.owner,
        upstream = %config.source.base_url,
        interval_secs = config.refresh.interval_secs,
        auth = config.token().is_some(),
        "starting snapshot service"
    );

    let source = HttpSource::from_config(&config.source)?;
    let cache = SnapshotCache::new();
    let hub = Arc::new(BroadcastHub::from_config(config.owner.clone(), &config.hub));
    let worker = spawn_refresh_worker(
        Arc::new(source),
        cache.clone(),
        Arc::clone(&hub),
        config.refresh.clone(),
    );

    let bind = config.server.bind.clone();
    let app = create_router(AppState::new(config, cache, hub, worker.trigger()));

    let listener = TcpListener::bind(&bind).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("http server stopped, waiting for refresh worker");
    worker.stop().await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
