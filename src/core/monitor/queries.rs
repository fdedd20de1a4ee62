// src/core/monitor/queries.rs

//! Read-only queries: node listings, the per-group state snapshot, the
//! event history, and the `synchronous_standby_names` string the primary's
//! keeper writes into the PostgreSQL configuration.

use super::Monitor;
use crate::core::errors::MonitorError;
use crate::core::events::Event;
use crate::core::health::Liveness;
use crate::core::metadata::Node;
use crate::core::state::ReplicationState;
use crate::core::types::{Lsn, SyncState};
use serde::Serialize;
use std::time::Instant;

/// The application-name tag a standby uses on its replication connection,
/// and therefore the token listed in `synchronous_standby_names`.
pub fn sync_standby_name(node_id: i64) -> String {
    format!("steward_standby_{node_id}")
}

/// One row of `get_nodes` / `get_other_nodes` / `get_primary`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NodeSummary {
    pub node_id: i64,
    pub node_name: String,
    pub node_host: String,
    pub node_port: u16,
    pub node_lsn: Lsn,
    pub node_is_primary: bool,
}

/// One row of `current_state`: both states plus the replication fields.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentStateRow {
    pub formation_id: String,
    pub group_id: i32,
    pub node_id: i64,
    pub node_name: String,
    pub node_host: String,
    pub node_port: u16,
    pub reported_state: ReplicationState,
    pub goal_state: ReplicationState,
    pub health: Liveness,
    pub reported_lsn: Lsn,
    pub reported_tli: u32,
    pub candidate_priority: i32,
    pub replication_quorum: bool,
    pub sync_state: SyncState,
    pub cluster_tag: String,
}

fn summarize(node: &Node) -> NodeSummary {
    NodeSummary {
        node_id: node.node_id,
        node_name: node.node_name.clone(),
        node_host: node.node_host.clone(),
        node_port: node.node_port,
        node_lsn: node.reported_lsn,
        node_is_primary: node.goal_state.is_writable()
            || node.goal_state == ReplicationState::ApplySettings,
    }
}

impl Monitor {
    /// The current primary of a group, or an error while the seat is being
    /// handed over.
    pub fn get_primary(
        &self,
        formation_id: &str,
        group_id: i32,
    ) -> Result<NodeSummary, MonitorError> {
        let formation_state = self.store().expect_formation(formation_id)?;
        let _meta = formation_state.meta.read();
        let group_arc = formation_state.existing_group(group_id).ok_or_else(|| {
            MonitorError::UndefinedObject(format!(
                "group {group_id} in formation \"{formation_id}\""
            ))
        })?;
        let group = group_arc.lock();
        group
            .nodes
            .values()
            .find(|n| {
                n.goal_state.is_writable() || n.goal_state == ReplicationState::ApplySettings
            })
            .map(summarize)
            .ok_or_else(|| {
                MonitorError::ObjectNotInPrerequisiteState(format!(
                    "group {group_id} of formation \"{formation_id}\" has no writable node right now"
                ))
            })
    }

    /// All nodes of a formation, optionally narrowed to one group.
    pub fn get_nodes(
        &self,
        formation_id: &str,
        group_id: Option<i32>,
    ) -> Result<Vec<NodeSummary>, MonitorError> {
        let formation_state = self.store().expect_formation(formation_id)?;
        let _meta = formation_state.meta.read();
        let mut rows = Vec::new();
        let mut group_ids: Vec<i32> = formation_state.groups.iter().map(|e| *e.key()).collect();
        group_ids.sort_unstable();
        for gid in group_ids {
            if group_id.is_some_and(|g| g != gid) {
                continue;
            }
            if let Some(group_arc) = formation_state.existing_group(gid) {
                let group = group_arc.lock();
                rows.extend(group.nodes.values().map(summarize));
            }
        }
        Ok(rows)
    }

    /// The peers of a node, optionally only those that reported a given
    /// state.
    pub fn get_other_nodes(
        &self,
        node_id: i64,
        current_state: Option<ReplicationState>,
    ) -> Result<Vec<NodeSummary>, MonitorError> {
        let location = self
            .store()
            .locate_node(node_id)
            .ok_or_else(|| MonitorError::UndefinedObject(format!("node {node_id}")))?;
        let _meta = location.formation.meta.read();
        let group = location.group.lock();
        Ok(group
            .nodes
            .values()
            .filter(|n| n.node_id != node_id)
            .filter(|n| current_state.is_none_or(|s| n.reported_state == s))
            .map(summarize)
            .collect())
    }

    /// One row per node with both states and the replication fields.
    pub fn current_state(
        &self,
        formation_id: &str,
        group_id: Option<i32>,
    ) -> Result<Vec<CurrentStateRow>, MonitorError> {
        let formation_state = self.store().expect_formation(formation_id)?;
        let _meta = formation_state.meta.read();
        let oracle = self.oracle();
        let now = Instant::now();
        let mut rows = Vec::new();
        let mut group_ids: Vec<i32> = formation_state.groups.iter().map(|e| *e.key()).collect();
        group_ids.sort_unstable();
        for gid in group_ids {
            if group_id.is_some_and(|g| g != gid) {
                continue;
            }
            if let Some(group_arc) = formation_state.existing_group(gid) {
                let group = group_arc.lock();
                for node in group.nodes.values() {
                    rows.push(CurrentStateRow {
                        formation_id: node.formation_id.clone(),
                        group_id: node.group_id,
                        node_id: node.node_id,
                        node_name: node.node_name.clone(),
                        node_host: node.node_host.clone(),
                        node_port: node.node_port,
                        reported_state: node.reported_state,
                        goal_state: node.goal_state,
                        health: oracle.classify(node, now),
                        reported_lsn: node.reported_lsn,
                        reported_tli: node.reported_tli,
                        candidate_priority: node.candidate_priority,
                        replication_quorum: node.replication_quorum,
                        sync_state: node.sync_state,
                        cluster_tag: node.cluster_tag.clone(),
                    });
                }
            }
        }
        Ok(rows)
    }

    /// The newest `count` events, optionally narrowed by formation and
    /// group, in chronological order.
    pub fn last_events(
        &self,
        formation_id: Option<&str>,
        group_id: Option<i32>,
        count: usize,
    ) -> Vec<Event> {
        self.events().last_events(formation_id, group_id, count)
    }

    /// The `synchronous_standby_names` value for a group: empty for a
    /// single-node group or when no standby participates in the quorum,
    /// otherwise `ANY N (...)` over the quorum members, with
    /// `N = max(number_sync_standbys, 1)`.
    pub fn synchronous_standby_names(
        &self,
        formation_id: &str,
        group_id: i32,
    ) -> Result<String, MonitorError> {
        let formation_state = self.store().expect_formation(formation_id)?;
        let meta = formation_state.meta.read();
        let group_arc = formation_state.existing_group(group_id).ok_or_else(|| {
            MonitorError::UndefinedObject(format!(
                "group {group_id} in formation \"{formation_id}\""
            ))
        })?;
        let group = group_arc.lock();

        if group.member_count() <= 1 {
            return Ok(String::new());
        }
        let names: Vec<String> = group
            .sync_standbys()
            .map(|n| sync_standby_name(n.node_id))
            .collect();
        if names.is_empty() {
            return Ok(String::new());
        }
        let required = meta.number_sync_standbys.max(1);
        Ok(format!("ANY {required} ({})", names.join(", ")))
    }
}
