// src/core/monitor/mod.rs

//! The `Monitor` facade: owns the metadata store, the event log, and the
//! core configuration, and exposes every procedure keepers and operators
//! call. Each operation takes the formation and group locks, stages its
//! decision on a snapshot, and only then commits; an error anywhere leaves
//! both metadata and events untouched.

pub mod admin;
pub mod node_active;
pub mod queries;
pub mod registration;

use crate::config::CoreConfig;
use crate::core::errors::MonitorError;
use crate::core::events::EventLog;
use crate::core::fsm::{Action, GroupFsm, Plan};
use crate::core::health::HealthOracle;
use crate::core::metadata::{Formation, Group, MetadataStore};
use crate::core::metrics;
use crate::core::state::ReplicationState;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct Monitor {
    config: CoreConfig,
    store: MetadataStore,
    events: EventLog,
    started_at: Instant,
}

impl Monitor {
    pub fn new(config: CoreConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            store: MetadataStore::new(),
            events: EventLog::new(),
            started_at: Instant::now(),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub(crate) fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub(crate) fn oracle(&self) -> HealthOracle {
        HealthOracle::new(self.config, self.started_at)
    }

    /// Computes one FSM step over the group as it stands. The group lock
    /// must already be held by the caller; nothing is mutated.
    pub(crate) fn decide(&self, formation: &Formation, group: &Group) -> Result<Plan, MonitorError> {
        let oracle = self.oracle();
        let fsm = GroupFsm {
            formation,
            group,
            oracle: &oracle,
            config: &self.config,
            now: Instant::now(),
        };
        fsm.proceed()
    }

    /// Applies a previously computed plan to the live group, appending one
    /// event (and one notification) per action. Runs under the caller's
    /// group lock so listeners observe commit order.
    pub(crate) fn apply_plan(&self, group: &mut Group, plan: &Plan) {
        let oracle = self.oracle();
        let now = Instant::now();
        for action in &plan.actions {
            match action {
                Action::AssignGoal {
                    node_id,
                    goal,
                    description,
                } => {
                    let Some(node) = group.nodes.get_mut(node_id) else {
                        warn!("Plan names node {} which is gone; skipping.", node_id);
                        continue;
                    };
                    let previous = node.goal_state;
                    if previous == *goal {
                        continue;
                    }
                    node.goal_state = *goal;
                    node.state_change_time = now;
                    info!(
                        formation = %node.formation_id,
                        group = node.group_id,
                        node = node.node_id,
                        name = %node.node_name,
                        "Setting goal state of node {} \"{}\" to {}: {}",
                        node.node_id, node.node_name, goal, description
                    );
                    if *goal == ReplicationState::Draining {
                        metrics::FAILOVERS_STARTED_TOTAL.inc();
                    }
                    if *goal == ReplicationState::WaitPrimary
                        && previous == ReplicationState::StopReplication
                    {
                        metrics::FAILOVERS_COMPLETED_TOTAL.inc();
                    }
                    let health = oracle.classify(node, now);
                    self.events.append(node, health, description);
                }
                Action::ClearPriorityBoost { node_id } => {
                    let Some(node) = group.nodes.get_mut(node_id) else {
                        continue;
                    };
                    if node.priority_boost == 0 {
                        continue;
                    }
                    node.candidate_priority -= node.priority_boost;
                    node.priority_boost = 0;
                    let description = format!(
                        "Candidate priority of node {} \"{}\" is back to {}",
                        node.node_id, node.node_name, node.candidate_priority
                    );
                    let health = oracle.classify(node, now);
                    self.events.append(node, health, &description);
                }
                Action::Note {
                    node_id,
                    description,
                } => {
                    let Some(node) = group.nodes.get(node_id) else {
                        continue;
                    };
                    let health = oracle.classify(node, now);
                    self.events.append(node, health, description);
                }
            }
        }
    }

    /// Convenience for admin operations: decide on the group as-is and
    /// apply, all under the caller's lock.
    pub(crate) fn run_fsm(
        &self,
        formation: &Formation,
        group: &mut Group,
    ) -> Result<(), MonitorError> {
        let plan = self.decide(formation, group)?;
        self.apply_plan(group, &plan);
        Ok(())
    }
}
