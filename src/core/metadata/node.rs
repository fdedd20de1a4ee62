// src/core/metadata/node.rs

//! The authoritative per-node row: identity, the state the keeper last
//! reported, the goal state the monitor last assigned, and the replication
//! metadata the FSM decides from.

use crate::core::state::ReplicationState;
use crate::core::types::{DEFAULT_CLUSTER_TAG, Lsn, NodeHealth, NodeKind, SyncState};
use std::time::Instant;

/// Upper bound of the user-visible candidate priority range.
pub const MAX_CANDIDATE_PRIORITY: i32 = 100;

/// A single managed node. Owned exclusively by the metadata store; the FSM
/// mutates rows only while holding the containing group's exclusive lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub node_id: i64,
    pub formation_id: String,
    pub group_id: i32,
    pub node_name: String,
    pub node_host: String,
    pub node_port: u16,
    /// The `pg_controldata` system identifier; all members of a group must
    /// agree on it.
    pub sys_identifier: u64,
    pub node_kind: NodeKind,

    pub reported_state: ReplicationState,
    pub goal_state: ReplicationState,
    pub reported_lsn: Lsn,
    pub reported_tli: u32,
    pub pg_is_running: bool,
    pub sync_state: SyncState,

    pub health: NodeHealth,
    pub report_time: Instant,
    pub health_check_time: Instant,
    pub state_change_time: Instant,

    /// Election weight in `[0, 100]`; zero means "never promote". The
    /// internal boost band `[101, 200]` is only entered transiently during
    /// operator-driven failovers.
    pub candidate_priority: i32,
    /// The boost (or penalty) currently folded into `candidate_priority`,
    /// kept so it can be removed exactly once the election settles.
    pub priority_boost: i32,
    pub replication_quorum: bool,
    pub cluster_tag: String,
}

impl Node {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_id: i64,
        formation_id: &str,
        group_id: i32,
        node_name: String,
        node_host: &str,
        node_port: u16,
        sys_identifier: u64,
        node_kind: NodeKind,
        initial_reported_state: ReplicationState,
        goal_state: ReplicationState,
        candidate_priority: i32,
        replication_quorum: bool,
        cluster_tag: String,
        now: Instant,
    ) -> Self {
        Self {
            node_id,
            formation_id: formation_id.to_string(),
            group_id,
            node_name,
            node_host: node_host.to_string(),
            node_port,
            sys_identifier,
            node_kind,
            reported_state: initial_reported_state,
            goal_state,
            reported_lsn: Lsn::INVALID,
            reported_tli: 0,
            pg_is_running: false,
            sync_state: SyncState::Unknown,
            health: NodeHealth::Unknown,
            report_time: now,
            health_check_time: now,
            state_change_time: now,
            candidate_priority,
            priority_boost: 0,
            replication_quorum,
            cluster_tag,
        }
    }

    /// Whether the keeper has converged on the assigned goal.
    pub fn has_reached_goal(&self) -> bool {
        self.reported_state == self.goal_state
    }

    pub fn is_read_replica(&self) -> bool {
        self.cluster_tag != DEFAULT_CLUSTER_TAG
    }

    /// A node that may win an election right now.
    pub fn is_failover_candidate(&self) -> bool {
        self.candidate_priority > 0
    }

    /// Counts toward `synchronous_standby_names` when it is a secondary.
    pub fn is_sync_standby(&self) -> bool {
        self.replication_quorum && self.goal_state == ReplicationState::Secondary
    }

    /// `host:port`, for logs and error details.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.node_host, self.node_port)
    }
}
