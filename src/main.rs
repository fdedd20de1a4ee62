// src/main.rs

//! The main entry point for the steward monitor.

use anyhow::Result;
use std::env;
use steward::config::MonitorConfig;
use steward::server;
use tracing::{error, info};
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("steward version {VERSION}");
        return Ok(());
    }

    // The configuration path can be provided via a --config flag; otherwise
    // it defaults to "steward.toml". A missing default file just means the
    // built-in defaults apply.
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config = match config_path {
        Some(path) => match MonitorConfig::from_file(path).await {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load configuration from \"{path}\": {e}");
                std::process::exit(1);
            }
        },
        None => match MonitorConfig::from_file("steward.toml").await {
            Ok(config) => config,
            Err(_) => MonitorConfig::default(),
        },
    };

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .compact()
        .with_ansi(true)
        .init();

    info!("Starting steward {VERSION}...");

    if let Err(e) = server::run(config).await {
        error!("Monitor runtime error: {}", e);
        return Err(e);
    }
    Ok(())
}
