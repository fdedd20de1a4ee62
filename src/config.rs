// src/config.rs

//! Manages monitor configuration: loading the TOML file, resolving defaults,
//! and handing the FSM its immutable set of timing values.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

/// One 16 MiB WAL segment, the unit both WAL-distance thresholds default to.
pub const WAL_SEGMENT_SIZE: u64 = 16 * 1024 * 1024;

/// Top-level monitor configuration, loaded from `steward.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Default log filter; `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub timeouts: CoreConfig,
}

/// The immutable timing values the decision core works with. Constructed once
/// at startup and passed through; the health classifier additionally takes
/// the current instant as a parameter, so tests can drive a synthetic clock.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CoreConfig {
    /// A node that has neither reported nor passed a health check for this
    /// long is a candidate for being declared unhealthy.
    #[serde(with = "humantime_serde", default = "default_unhealthy_timeout")]
    pub unhealthy_timeout: Duration,

    /// After the monitor starts, health verdicts are not trusted until this
    /// grace period has passed and at least one probe has run.
    #[serde(with = "humantime_serde", default = "default_startup_grace_period")]
    pub startup_grace_period: Duration,

    /// How long a demoted primary may linger in `demote_timeout` before the
    /// failover proceeds without its acknowledgment.
    #[serde(with = "humantime_serde", default = "default_drain_timeout")]
    pub drain_timeout: Duration,

    /// A catching-up standby within this many bytes of the primary becomes a
    /// synchronous standby.
    #[serde(default = "default_enable_sync_wal_threshold")]
    pub enable_sync_wal_threshold: u64,

    /// Refuse to promote when the most advanced standby is further than this
    /// many bytes behind the last known primary position.
    #[serde(default = "default_promote_wal_threshold")]
    pub promote_wal_threshold: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            unhealthy_timeout: default_unhealthy_timeout(),
            startup_grace_period: default_startup_grace_period(),
            drain_timeout: default_drain_timeout(),
            enable_sync_wal_threshold: default_enable_sync_wal_threshold(),
            promote_wal_threshold: default_promote_wal_threshold(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            timeouts: CoreConfig::default(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    6432
}

fn default_log_level() -> String {
    "info,steward::core::fsm=debug".to_string()
}

fn default_unhealthy_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_startup_grace_period() -> Duration {
    Duration::from_secs(10)
}

fn default_drain_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_enable_sync_wal_threshold() -> u64 {
    WAL_SEGMENT_SIZE
}

fn default_promote_wal_threshold() -> u64 {
    WAL_SEGMENT_SIZE
}

impl MonitorConfig {
    pub async fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let config: MonitorConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
