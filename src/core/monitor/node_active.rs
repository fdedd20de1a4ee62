// src/core/monitor/node_active.rs

//! The `node_active` protocol: every keeper calls this on its cadence to
//! report the state it reached and to learn the goal state it should now
//! converge toward. This is also what drives the FSM for the node's group.

use super::Monitor;
use crate::core::errors::MonitorError;
use crate::core::metadata::Node;
use crate::core::metrics;
use crate::core::state::ReplicationState;
use crate::core::types::{Lsn, SyncState};
use std::time::Instant;
use tracing::debug;

/// One heartbeat from a keeper.
#[derive(Debug, Clone)]
pub struct NodeActiveParams {
    pub formation: String,
    pub node_id: i64,
    pub group_id: i32,
    pub reported_state: ReplicationState,
    pub pg_is_running: bool,
    pub tli: u32,
    pub lsn: Lsn,
    pub sync_state: SyncState,
}

/// The assignment returned on every heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Assignment {
    pub node_id: i64,
    pub group_id: i32,
    pub goal_state: ReplicationState,
    pub candidate_priority: i32,
    pub replication_quorum: bool,
}

impl Monitor {
    pub fn node_active(&self, params: &NodeActiveParams) -> Result<Assignment, MonitorError> {
        metrics::NODE_ACTIVE_TOTAL.inc();

        let formation_state = self.store().expect_formation(&params.formation)?;
        // Share lock on the formation for the report, exclusive group lock
        // for the FSM run.
        let meta = formation_state.meta.read();
        let group_arc = formation_state
            .existing_group(params.group_id)
            .ok_or_else(|| {
                MonitorError::UndefinedObject(format!(
                    "group {} in formation \"{}\"",
                    params.group_id, params.formation
                ))
            })?;
        let mut group = group_arc.lock();
        if !group.nodes.contains_key(&params.node_id) {
            return Err(MonitorError::UndefinedObject(format!(
                "node {} in group {} of formation \"{}\"",
                params.node_id, params.group_id, params.formation
            )));
        }

        let now = Instant::now();

        // Stage the report on a snapshot, decide, then commit both. A
        // decision error leaves the row exactly as it was.
        let mut staged = group.clone();
        let staged_node = staged.nodes.get_mut(&params.node_id).expect("checked above");
        let reported_state_changed = staged_node.reported_state != params.reported_state;
        apply_report(staged_node, params, now);
        let plan = self.decide(&meta, &staged)?;

        let node = group.nodes.get_mut(&params.node_id).expect("checked above");
        apply_report(node, params, now);
        if reported_state_changed {
            let health = self.oracle().classify(node, now);
            let description = format!(
                "Node {} \"{}\" reported state {}",
                node.node_id, node.node_name, node.reported_state
            );
            self.events().append(node, health, &description);
        }
        self.apply_plan(&mut group, &plan);

        let node = &group.nodes[&params.node_id];
        Ok(Assignment {
            node_id: node.node_id,
            group_id: node.group_id,
            goal_state: node.goal_state,
            candidate_priority: node.candidate_priority,
            replication_quorum: node.replication_quorum,
        })
    }
}

/// Folds one report into the node row. The reported WAL position is
/// monotonic per timeline: a regression on the same timeline is kept out of
/// the metadata unless the node is rewinding on purpose (fast-forward) or
/// has just been promoted onto a new timeline.
fn apply_report(node: &mut Node, params: &NodeActiveParams, now: Instant) {
    node.reported_state = params.reported_state;
    node.pg_is_running = params.pg_is_running;
    node.sync_state = params.sync_state;
    node.report_time = now;

    let timeline_changed = params.tli != node.reported_tli;
    let rewinding = matches!(
        params.reported_state,
        ReplicationState::FastForward | ReplicationState::WaitPrimary
    );
    if params.lsn.is_valid() {
        if timeline_changed || rewinding || params.lsn >= node.reported_lsn {
            node.reported_lsn = params.lsn;
        } else {
            debug!(
                "Ignoring WAL position regression of node {} \"{}\" on timeline {}: {} < {}",
                node.node_id, node.node_name, params.tli, params.lsn, node.reported_lsn
            );
        }
    }
    if params.tli != 0 {
        node.reported_tli = params.tli;
    }
}
