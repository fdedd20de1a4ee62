// src/core/health.rs

//! The health oracle: a pure classifier over a node's reporting and probing
//! history. It schedules nothing; probe results arrive through
//! `report_node_health` and heartbeats through `node_active`, and the FSM
//! asks this module what they add up to at a given instant.

use crate::config::CoreConfig;
use crate::core::metadata::Node;
use crate::core::state::ReplicationState;
use crate::core::types::NodeHealth;
use serde::Serialize;
use std::time::Instant;
use strum_macros::Display;

/// The overall verdict for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Liveness {
    /// Probes pass and Postgres runs.
    Healthy,
    /// Postgres is down or probes fail, but the keeper still reports. Such a
    /// node cannot be promoted, yet it may still publish its WAL position
    /// during an election.
    Degraded,
    /// Neither probes nor heartbeats reach the node.
    Unhealthy,
    /// Not enough probe history to say either way.
    Unknown,
}

/// Classifier over wall-clock inputs. The monitor's own start time is part
/// of the state: verdicts recorded before the monitor (re)started are not
/// trusted until a startup grace period has passed.
#[derive(Debug, Clone, Copy)]
pub struct HealthOracle {
    config: CoreConfig,
    monitor_start: Instant,
}

impl HealthOracle {
    pub fn new(config: CoreConfig, monitor_start: Instant) -> Self {
        Self {
            config,
            monitor_start,
        }
    }

    /// A node is healthy iff the last probe passed and Postgres is running.
    pub fn is_healthy(&self, node: &Node) -> bool {
        node.health == NodeHealth::Good && node.pg_is_running
    }

    /// A node is unhealthy when its keeper says Postgres is down, or when it
    /// has gone silent past the unhealthy timeout with a failing probe on
    /// record. The probe branch only counts once the monitor has been up
    /// past its startup grace period and has probed since starting, so a
    /// restarted monitor does not demote nodes on stale verdicts.
    pub fn is_unhealthy(&self, node: &Node, now: Instant) -> bool {
        if node.reported_state != ReplicationState::Unknown && !node.pg_is_running {
            return true;
        }
        now.duration_since(node.report_time) > self.config.unhealthy_timeout
            && node.health == NodeHealth::Bad
            && node.health_check_time > self.monitor_start
            && now.duration_since(self.monitor_start) > self.config.startup_grace_period
    }

    /// Whether the keeper itself is still calling in. An unhealthy node that
    /// is still reporting may participate in `report_lsn` rounds.
    pub fn is_reporting(&self, node: &Node, now: Instant) -> bool {
        now.duration_since(node.report_time) <= self.config.unhealthy_timeout
    }

    /// Whether a demoted primary has overstayed `demote_timeout`, letting
    /// the failover finish without its acknowledgment.
    pub fn drain_expired(&self, node: &Node, now: Instant) -> bool {
        node.goal_state == ReplicationState::DemoteTimeout
            && now.duration_since(node.state_change_time) > self.config.drain_timeout
    }

    /// The combined verdict, used for `current_state` and notifications.
    pub fn classify(&self, node: &Node, now: Instant) -> Liveness {
        if self.is_healthy(node) {
            Liveness::Healthy
        } else if self.is_unhealthy(node, now) {
            if self.is_reporting(node, now) {
                Liveness::Degraded
            } else {
                Liveness::Unhealthy
            }
        } else {
            Liveness::Unknown
        }
    }
}
