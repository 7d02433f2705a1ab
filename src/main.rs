// src/main.rs

//! Binary entry point: flag handling, logging setup, daemon startup.

use anyhow::Result;
use scaleguard::config::Config;
use scaleguard::server;
use std::env;
use tracing::error;
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("ScaleGuard version {VERSION}");
        return Ok(());
    }

    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("config.toml");

    // Config errors go to stderr: the subscriber isn't up yet because its
    // level comes from the config itself.
    let config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("scaleguard: {e:#}");
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .compact()
        .with_ansi(true)
        .init();

    // Run under a supervisor: any fatal error exits non-zero so the
    // supervisor restarts the process.
    if let Err(e) = server::run(config).await {
        error!("ScaleGuard runtime error: {}", e);
        return Err(e);
    }

    Ok(())
}
