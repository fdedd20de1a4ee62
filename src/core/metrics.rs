// src/core/metrics.rs

//! Defines and registers Prometheus metrics for the monitor.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only
//! once globally for the entire process lifecycle. The text encoding is
//! served through the monitor protocol's `metrics` request.

use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, TextEncoder, register_counter, register_gauge};

lazy_static! {
    /// Total `node_active` calls handled.
    pub static ref NODE_ACTIVE_TOTAL: Counter = register_counter!(
        "steward_node_active_total",
        "Total number of node_active calls handled."
    )
    .unwrap();

    /// Total events appended to the event log.
    pub static ref EVENTS_APPENDED_TOTAL: Counter = register_counter!(
        "steward_events_appended_total",
        "Total number of events appended to the event log."
    )
    .unwrap();

    /// Failovers started (a primary was put in draining).
    pub static ref FAILOVERS_STARTED_TOTAL: Counter = register_counter!(
        "steward_failovers_started_total",
        "Total number of failovers started."
    )
    .unwrap();

    /// Failovers completed (a candidate reached wait_primary).
    pub static ref FAILOVERS_COMPLETED_TOTAL: Counter = register_counter!(
        "steward_failovers_completed_total",
        "Total number of failovers completed."
    )
    .unwrap();

    /// Promotions refused because the WAL-distance guard tripped.
    pub static ref PROMOTIONS_REFUSED_TOTAL: Counter = register_counter!(
        "steward_promotions_refused_total",
        "Total number of promotions refused by the WAL-distance guard."
    )
    .unwrap();

    /// The number of nodes currently registered.
    pub static ref REGISTERED_NODES: Gauge = register_gauge!(
        "steward_registered_nodes",
        "Number of currently registered nodes."
    )
    .unwrap();
}

/// Renders the full registry in the Prometheus text exposition format.
pub fn render() -> String {
    let metric_families = prometheus::gather();
    TextEncoder::new()
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
