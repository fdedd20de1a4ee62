// src/core/metadata/formation.rs

//! Formations and groups: the administrative containers nodes live in,
//! together with the lock layout backing the locking discipline
//! (share/exclusive formation lock, exclusive per-group lock).

use crate::core::metadata::node::Node;
use crate::core::state::ReplicationState;
use crate::core::types::FormationKind;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A formation row: a named boundary grouping one or more replication groups
/// of the same kind. `kind` and `dbname` are fixed once the first node has
/// registered.
#[derive(Debug, Clone)]
pub struct Formation {
    pub formation_id: String,
    pub kind: FormationKind,
    pub dbname: String,
    /// Whether the formation runs standbys at all.
    pub opt_secondary: bool,
    pub number_sync_standbys: i32,
}

/// One replication group: the set of nodes that replicate together. Exactly
/// one member is writable at any time.
#[derive(Debug, Clone, Default)]
pub struct Group {
    pub group_id: i32,
    /// Nodes keyed by id; `BTreeMap` keeps listings in node-id order.
    pub nodes: BTreeMap<i64, Node>,
}

impl Group {
    pub fn new(group_id: i32) -> Self {
        Self {
            group_id,
            nodes: BTreeMap::new(),
        }
    }

    /// The node currently holding the primary seat, if any. More than one
    /// holder is an invariant violation the FSM reports before deciding
    /// anything else.
    pub fn primary(&self) -> Option<&Node> {
        self.nodes
            .values()
            .find(|n| n.goal_state.holds_primary_seat())
    }

    /// Standbys of the group, excluding nodes on their way out.
    pub fn standbys(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| {
            !n.goal_state.holds_primary_seat() && n.goal_state != ReplicationState::Dropped
        })
    }

    /// Standbys that would take part in a failover right now: following the
    /// primary (or catching up with it) and not parked in maintenance.
    pub fn active_standbys(&self) -> impl Iterator<Item = &Node> {
        self.standbys()
            .filter(|n| n.goal_state.is_failover_candidate_state())
    }

    /// Number of nodes that still count as members (everything but rows
    /// already confirmed dropped).
    pub fn member_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| n.goal_state != ReplicationState::Dropped)
            .count()
    }

    /// Sync-capable standbys: replication-quorum members currently assigned
    /// `secondary`.
    pub fn sync_standbys(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| n.is_sync_standby())
    }

    /// Whether any node of the group is part of an ongoing failover.
    pub fn failover_in_progress(&self) -> bool {
        self.nodes.values().any(|n| {
            n.goal_state.is_being_promoted()
                || matches!(
                    n.goal_state,
                    ReplicationState::ReportLsn
                        | ReplicationState::Draining
                        | ReplicationState::DemoteTimeout
                )
        })
    }
}

/// The lock container for one formation. The `meta` lock is the formation
/// lock of the concurrency model: reads take it shared, administrative
/// writes take it exclusively. Each group carries its own mutex, which is
/// the exclusive group lock every FSM run holds. Lock order is always
/// formation before group; neither is ever held across an `.await`.
#[derive(Debug)]
pub struct FormationState {
    pub meta: RwLock<Formation>,
    pub groups: DashMap<i32, Arc<Mutex<Group>>>,
}

impl FormationState {
    pub fn new(formation: Formation) -> Self {
        Self {
            meta: RwLock::new(formation),
            groups: DashMap::new(),
        }
    }

    /// Fetches the group, creating it on first use.
    pub fn group(&self, group_id: i32) -> Arc<Mutex<Group>> {
        self.groups
            .entry(group_id)
            .or_insert_with(|| Arc::new(Mutex::new(Group::new(group_id))))
            .clone()
    }

    pub fn existing_group(&self, group_id: i32) -> Option<Arc<Mutex<Group>>> {
        self.groups.get(&group_id).map(|g| g.clone())
    }

    /// Total number of registered nodes across all groups.
    pub fn node_count(&self) -> usize {
        self.groups
            .iter()
            .map(|entry| entry.value().lock().nodes.len())
            .sum()
    }
}
