// src/server/mod.rs

//! The network surface of the monitor: the TCP listener, the JSON-lines
//! protocol, and the notification streaming mode.

pub mod listener;
pub mod protocol;

use crate::config::MonitorConfig;
use crate::core::Monitor;
use anyhow::Result;
use tracing::info;

/// Runs the monitor until the process is interrupted.
pub async fn run(config: MonitorConfig) -> Result<()> {
    let monitor = Monitor::new(config.timeouts);

    tokio::select! {
        result = listener::run_listener(&config.host, config.port, monitor) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt, shutting down.");
            Ok(())
        }
    }
}
