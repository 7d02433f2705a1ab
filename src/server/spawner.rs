// src/server/spawner.rs

//! Wires the daemon's background tasks into the supervision JoinSet.

use super::context::ServerContext;
use super::metrics_server;
use anyhow::Result;
use tracing::info;

pub fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    // Metrics exporter
    if ctx.config.metrics.enabled {
        let port = ctx.config.metrics.port;
        let shutdown_rx_metrics = ctx.shutdown_tx.subscribe();
        ctx.background_tasks.spawn(async move {
            metrics_server::run_metrics_server(port, shutdown_rx_metrics).await;
            Ok(())
        });
    } else {
        info!("metrics exporter disabled by configuration");
    }

    // Cluster observer
    if let Some(observer) = ctx.observer.take() {
        let shutdown_rx_observer = ctx.shutdown_tx.subscribe();
        ctx.background_tasks.spawn(async move {
            observer.run(shutdown_rx_observer).await;
            Ok(())
        });
    } else {
        info!("cluster observer disabled by configuration");
    }

    Ok(())
}
