// src/core/fsm/mod.rs

//! The group finite state machine: the decision procedure that, given the
//! reported states of all nodes in a group, computes the next goal-state
//! assignments. It runs on every heartbeat and at the end of each
//! administrative operation, always under the group's exclusive lock.
//!
//! The FSM never mutates anything itself. `proceed` pattern-matches on the
//! group and returns a [`Plan`]; the monitor applies the plan, appends
//! events, and publishes notifications, or applies nothing at all when the
//! FSM reports an invariant violation. One invocation produces at most one
//! rule's worth of transitions, so progress is always bounded and driven by
//! heartbeat cadence.

pub mod convergence;
pub mod failover;
pub mod selector;

use crate::config::CoreConfig;
use crate::core::errors::MonitorError;
use crate::core::health::HealthOracle;
use crate::core::metadata::{Formation, Group};
use crate::core::state::ReplicationState;
use std::time::Instant;

/// One effect the FSM wants applied to the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Assign a new goal state to a node.
    AssignGoal {
        node_id: i64,
        goal: ReplicationState,
        description: String,
    },
    /// Remove the transient election boost folded into a node's priority.
    ClearPriorityBoost { node_id: i64 },
    /// Append an event without changing any state (progress reports while
    /// waiting, refusals by the data-loss guard).
    Note { node_id: i64, description: String },
}

/// The ordered set of effects one FSM invocation produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub actions: Vec<Action>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, node_id: i64, goal: ReplicationState, description: impl Into<String>) {
        self.actions.push(Action::AssignGoal {
            node_id,
            goal,
            description: description.into(),
        });
    }

    pub fn clear_boost(&mut self, node_id: i64) {
        self.actions.push(Action::ClearPriorityBoost { node_id });
    }

    pub fn note(&mut self, node_id: i64, description: impl Into<String>) {
        self.actions.push(Action::Note {
            node_id,
            description: description.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// The goal assigned to a node by this plan, if any.
    pub fn assigned_goal(&self, node_id: i64) -> Option<ReplicationState> {
        self.actions.iter().find_map(|a| match a {
            Action::AssignGoal {
                node_id: id, goal, ..
            } if *id == node_id => Some(*goal),
            _ => None,
        })
    }
}

/// One FSM evaluation over a consistent snapshot of a group.
pub struct GroupFsm<'a> {
    pub formation: &'a Formation,
    pub group: &'a Group,
    pub oracle: &'a HealthOracle,
    pub config: &'a CoreConfig,
    pub now: Instant,
}

impl GroupFsm<'_> {
    /// Runs the decision procedure. Rules are ordered: in-flight failover
    /// orchestration first, then failover detection, then steady-state
    /// convergence. The first rule that has something to say wins.
    pub fn proceed(&self) -> Result<Plan, MonitorError> {
        self.check_single_writer()?;

        let rules: [fn(&Self) -> Option<Plan>; 13] = [
            Self::promotion_progress,
            Self::cascade_to_join_secondary,
            Self::election,
            Self::failover_trigger,
            Self::release_parked_standbys,
            Self::demoted_rejoin,
            Self::join_secondary_follow,
            Self::maintenance_progress,
            Self::single_degeneration,
            Self::standby_joins,
            Self::catchingup_to_secondary,
            Self::secondary_health_watch,
            Self::primary_convergence,
        ];

        for rule in rules {
            if let Some(plan) = rule(self) {
                return Ok(plan);
            }
        }
        Ok(Plan::new())
    }

    /// At most one node per group may be writable: reported state and goal
    /// state both in {single, wait_primary, primary, join_primary}. Two such
    /// nodes mean the metadata no longer describes a safe group; the
    /// enclosing operation is aborted and the operator alerted.
    fn check_single_writer(&self) -> Result<(), MonitorError> {
        let writable: Vec<_> = self
            .group
            .nodes
            .values()
            .filter(|n| n.reported_state.is_writable() && n.goal_state.is_writable())
            .collect();
        if writable.len() > 1 {
            let names: Vec<String> = writable.iter().map(|n| n.node_name.clone()).collect();
            return Err(MonitorError::InvariantViolation(format!(
                "group {} of formation \"{}\" has {} writable nodes: {}",
                self.group.group_id,
                self.formation.formation_id,
                writable.len(),
                names.join(", ")
            )));
        }
        Ok(())
    }
}
