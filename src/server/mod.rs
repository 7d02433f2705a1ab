// src/server/mod.rs

//! The daemon startup function: assembles the context, spawns background
//! tasks, runs the queue dispatcher until shutdown or fatal error.

use crate::config::Config;
use crate::core::ScaleGuardError;
use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod context;
mod initialization;
mod metrics_server;
mod spawner;

pub use context::ServerContext;

pub async fn run(config: Config) -> Result<()> {
    // 1. Build clients, services, and the dispatcher.
    let mut ctx = initialization::setup(config).await?;

    // 2. Spawn the background tasks (metrics server, cluster observer).
    spawner::spawn_all(&mut ctx)?;

    // 3. Translate process signals into dispatcher cancellation.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_cancel.cancel();
    });

    // 4. Run the dispatcher; it only returns on cancellation or failure.
    let result = ctx.dispatcher.run(cancel, ctx.orchestrator.clone()).await;

    // 5. Stop background tasks and wait for them before reporting.
    let _ = ctx.shutdown_tx.send(());
    while ctx.background_tasks.join_next().await.is_some() {}

    match result {
        Ok(()) | Err(ScaleGuardError::Cancelled) => {
            info!("shutdown complete");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
