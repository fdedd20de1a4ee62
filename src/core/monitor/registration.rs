// src/core/monitor/registration.rs

//! Node registration: assigning a new node to a group, picking its initial
//! goal state, and enforcing formation-wide uniformity (kind, dbname,
//! system identifier).

use super::Monitor;
use crate::core::errors::MonitorError;
use crate::core::metadata::{Formation, Group, MAX_CANDIDATE_PRIORITY, Node};
use crate::core::metrics;
use crate::core::state::ReplicationState;
use crate::core::types::{DEFAULT_CLUSTER_TAG, FormationKind, NodeKind};
use std::time::Instant;
use tracing::info;

/// Everything a keeper sends when it first contacts the monitor.
#[derive(Debug, Clone)]
pub struct RegisterParams {
    pub formation: String,
    pub host: String,
    pub port: u16,
    pub dbname: String,
    /// May be empty; the monitor then assigns `node_<id>`.
    pub name: String,
    pub sys_identifier: u64,
    /// `-1` to let the monitor assign one.
    pub desired_node_id: i64,
    /// `-1` for automatic placement (citus); pgsql formations only have 0.
    pub desired_group_id: i32,
    pub initial_state: ReplicationState,
    pub node_kind: NodeKind,
    pub candidate_priority: i32,
    pub replication_quorum: bool,
    pub cluster_tag: String,
}

/// What the keeper gets back and persists in its own state file.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RegisterResult {
    pub node_id: i64,
    pub group_id: i32,
    pub goal_state: ReplicationState,
    pub candidate_priority: i32,
    pub replication_quorum: bool,
    pub node_name: String,
}

impl Monitor {
    pub fn register_node(&self, params: RegisterParams) -> Result<RegisterResult, MonitorError> {
        if !(0..=MAX_CANDIDATE_PRIORITY).contains(&params.candidate_priority) {
            return Err(MonitorError::InvalidParameterValue(format!(
                "candidate priority must be between 0 and {MAX_CANDIDATE_PRIORITY}, got {}",
                params.candidate_priority
            )));
        }
        if params.cluster_tag != DEFAULT_CLUSTER_TAG && params.candidate_priority != 0 {
            return Err(MonitorError::InvalidParameterValue(format!(
                "a node tagged \"{}\" is a read replica and must keep candidate priority 0",
                params.cluster_tag
            )));
        }

        // A keeper that lost our answer retries with the same host:port; give
        // it the row it already owns.
        if let Some(location) = self
            .store()
            .locate_node_by_addr(&params.host, params.port)
        {
            let group = location.group.lock();
            let node = &group.nodes[&location.node_id];
            if params.desired_node_id == -1 || params.desired_node_id == node.node_id {
                return Ok(RegisterResult {
                    node_id: node.node_id,
                    group_id: node.group_id,
                    goal_state: node.goal_state,
                    candidate_priority: node.candidate_priority,
                    replication_quorum: node.replication_quorum,
                    node_name: node.node_name.clone(),
                });
            }
            return Err(MonitorError::ObjectInUse(format!(
                "{}:{} is already registered as node {}",
                params.host, params.port, node.node_id
            )));
        }

        // Id collisions are checked before any lock is taken: the store-wide
        // scan must not re-enter the group lock held below.
        if params.desired_node_id >= 0
            && self.store().locate_node(params.desired_node_id).is_some()
        {
            return Err(MonitorError::ObjectInUse(format!(
                "node id {} is already registered",
                params.desired_node_id
            )));
        }

        let implied_kind = params.node_kind.implied_formation_kind();
        let formation_state = self.store().formation_or_insert(Formation {
            formation_id: params.formation.clone(),
            kind: implied_kind,
            dbname: params.dbname.clone(),
            opt_secondary: true,
            number_sync_standbys: 0,
        });

        // Exclusive formation lock for the whole registration.
        let mut meta = formation_state.meta.write();
        if formation_state.node_count() == 0 {
            // The first node fixes the formation's kind and dbname.
            meta.kind = implied_kind;
            meta.dbname = params.dbname.clone();
        } else {
            if !params.node_kind.matches_formation(meta.kind) {
                return Err(MonitorError::InvalidObjectDefinition(format!(
                    "a {} node cannot join formation \"{}\" of kind {}",
                    params.node_kind, meta.formation_id, meta.kind
                )));
            }
            if params.dbname != meta.dbname {
                return Err(MonitorError::InvalidObjectDefinition(format!(
                    "formation \"{}\" manages database \"{}\", not \"{}\"",
                    meta.formation_id, meta.dbname, params.dbname
                )));
            }
        }

        let group_id = choose_group(&meta, &formation_state, &params)?;
        let group_arc = formation_state.group(group_id);
        let mut group = group_arc.lock();

        if params.sys_identifier != 0 {
            let mismatch = group.nodes.values().find(|n| {
                n.sys_identifier != 0 && n.sys_identifier != params.sys_identifier
            });
            if let Some(peer) = mismatch {
                return Err(MonitorError::InvalidObjectDefinition(format!(
                    "system identifier {} does not match node {} \"{}\" ({})",
                    params.sys_identifier, peer.node_id, peer.node_name, peer.sys_identifier
                )));
            }
        }

        let goal_state = initial_goal_state(&meta, &group, &params)?;

        let node_id = if params.desired_node_id >= 0 {
            self.store().claim_node_id(params.desired_node_id);
            params.desired_node_id
        } else {
            self.store().next_node_id()
        };

        let node_name = if params.name.is_empty() {
            format!("node_{node_id}")
        } else {
            // The current group is already locked; scan it directly and only
            // take the other groups' locks.
            let name_taken = group.nodes.values().any(|n| n.node_name == params.name)
                || formation_state
                    .groups
                    .iter()
                    .filter(|entry| *entry.key() != group_id)
                    .any(|entry| {
                        entry
                            .value()
                            .lock()
                            .nodes
                            .values()
                            .any(|n| n.node_name == params.name)
                    });
            if name_taken {
                return Err(MonitorError::InvalidObjectDefinition(format!(
                    "node name \"{}\" is already in use in formation \"{}\"",
                    params.name, meta.formation_id
                )));
            }
            params.name.clone()
        };

        let node = Node::new(
            node_id,
            &meta.formation_id,
            group_id,
            node_name.clone(),
            &params.host,
            params.port,
            params.sys_identifier,
            params.node_kind,
            params.initial_state,
            goal_state,
            params.candidate_priority,
            params.replication_quorum,
            params.cluster_tag.clone(),
            Instant::now(),
        );

        // Stage the insert, let the group react, then commit both together.
        let mut staged = group.clone();
        staged.nodes.insert(node_id, node.clone());
        let plan = self.decide(&meta, &staged)?;

        group.nodes.insert(node_id, node);
        let registered = &group.nodes[&node_id];
        info!(
            "Registered node {} \"{}\" ({}) in group {} of formation \"{}\" with goal state {}",
            node_id,
            node_name,
            registered.addr(),
            group_id,
            meta.formation_id,
            goal_state
        );
        self.events().append(
            registered,
            self.oracle().classify(registered, Instant::now()),
            &format!(
                "New node {node_id} \"{node_name}\" registered with goal state {goal_state}"
            ),
        );
        self.apply_plan(&mut group, &plan);
        metrics::REGISTERED_NODES.inc();

        if maybe_bump_number_sync_standbys(&mut meta, &group) {
            if let Some(primary) = group.primary() {
                let description = format!(
                    "Setting number_sync_standbys of formation \"{}\" to 1 now that it has two sync-capable standbys",
                    meta.formation_id
                );
                info!("{description}");
                self.events().append(
                    primary,
                    self.oracle().classify(primary, Instant::now()),
                    &description,
                );
            }
        }

        let registered = &group.nodes[&node_id];
        Ok(RegisterResult {
            node_id,
            group_id,
            goal_state: registered.goal_state,
            candidate_priority: registered.candidate_priority,
            replication_quorum: registered.replication_quorum,
            node_name,
        })
    }
}

/// Picks the target group for a registration: pgsql formations only have
/// group 0, citus formations reserve it for the coordinator and place
/// workers in the lowest group that can take them.
fn choose_group(
    meta: &Formation,
    formation_state: &crate::core::metadata::FormationState,
    params: &RegisterParams,
) -> Result<i32, MonitorError> {
    match meta.kind {
        FormationKind::Pgsql => {
            if params.desired_group_id > 0 {
                return Err(MonitorError::InvalidParameterValue(format!(
                    "formation \"{}\" is a pgsql formation and only has group 0",
                    meta.formation_id
                )));
            }
            Ok(0)
        }
        FormationKind::Citus => match params.node_kind {
            NodeKind::Coordinator => Ok(0),
            NodeKind::Worker => {
                if params.desired_group_id == 0 {
                    return Err(MonitorError::InvalidParameterValue(
                        "group 0 is reserved for the coordinator".to_string(),
                    ));
                }
                if params.desired_group_id > 0 {
                    return Ok(params.desired_group_id);
                }
                // Lowest worker group that is empty, or that has a lone
                // primary waiting for its standby; otherwise a fresh group.
                let mut max_group = 0;
                let mut best: Option<i32> = None;
                for entry in formation_state.groups.iter() {
                    let gid = *entry.key();
                    if gid == 0 {
                        continue;
                    }
                    max_group = max_group.max(gid);
                    let members = entry.value().lock().member_count();
                    let joinable = members == 0 || (members == 1 && meta.opt_secondary);
                    if joinable && best.is_none_or(|b| gid < b) {
                        best = Some(gid);
                    }
                }
                Ok(best.unwrap_or(max_group + 1))
            }
            NodeKind::Standalone => unreachable!("kind mismatch is rejected before placement"),
        },
    }
}

/// Picks the initial goal state for a registration based on what else is
/// in the group.
fn initial_goal_state(
    meta: &Formation,
    group: &Group,
    params: &RegisterParams,
) -> Result<ReplicationState, MonitorError> {
    if group.member_count() == 0 {
        if params.candidate_priority == 0 {
            return Err(MonitorError::InvalidObjectDefinition(
                "the first node of a group must have a non-zero candidate priority, \
                 otherwise no failover could ever be run"
                    .to_string(),
            ));
        }
        return Ok(ReplicationState::Single);
    }

    if !meta.opt_secondary {
        return Err(MonitorError::InvalidObjectDefinition(format!(
            "formation \"{}\" does not allow standby nodes",
            meta.formation_id
        )));
    }

    let has_upstream = group.nodes.values().any(|n| {
        n.goal_state.holds_primary_seat()
            || n.goal_state.is_being_promoted()
            || n.goal_state == ReplicationState::ReportLsn
    });
    if has_upstream {
        Ok(ReplicationState::WaitStandby)
    } else {
        Err(MonitorError::TryAgain(
            "group has no primary to register a standby against".to_string(),
        ))
    }
}

/// The moment a second sync-capable standby appears, a formation still at
/// `number_sync_standbys = 0` is bumped to 1.
fn maybe_bump_number_sync_standbys(meta: &mut Formation, group: &Group) -> bool {
    if meta.number_sync_standbys != 0 {
        return false;
    }
    let sync_capable = group
        .nodes
        .values()
        .filter(|n| {
            n.replication_quorum
                && !n.goal_state.holds_primary_seat()
                && n.goal_state != ReplicationState::Dropped
        })
        .count();
    if sync_capable == 2 {
        meta.number_sync_standbys = 1;
        return true;
    }
    false
}
