// src/core/fsm/convergence.rs

//! Steady-state convergence rules: opening replication for joining
//! standbys, promoting catching-up nodes into the synchronous quorum,
//! letting a recovered primary rejoin as a standby, and walking nodes in
//! and out of maintenance.

use super::{GroupFsm, Plan};
use crate::core::state::ReplicationState;

impl GroupFsm<'_> {
    /// A formerly demoted primary that reports back rejoins as a standby of
    /// the new primary. If the new primary is already fully converged it
    /// passes through `join_primary` to open a replication slot for the
    /// returning node.
    pub(super) fn demoted_rejoin(&self) -> Option<Plan> {
        let demoted = self.group.nodes.values().find(|n| {
            n.goal_state == ReplicationState::Demoted
                && n.has_reached_goal()
                && self.oracle.is_reporting(n, self.now)
        })?;
        let primary = self.group.primary()?;
        if !matches!(
            primary.goal_state,
            ReplicationState::WaitPrimary
                | ReplicationState::Primary
                | ReplicationState::JoinPrimary
        ) {
            return None;
        }

        let mut plan = Plan::new();
        plan.assign(
            demoted.node_id,
            ReplicationState::CatchingUp,
            format!(
                "Node {} \"{}\" rejoins group {} as a standby of node {} \"{}\"",
                demoted.node_id,
                demoted.node_name,
                self.group.group_id,
                primary.node_id,
                primary.node_name
            ),
        );
        if primary.goal_state == ReplicationState::Primary {
            plan.assign(
                primary.node_id,
                ReplicationState::JoinPrimary,
                format!(
                    "Node {} \"{}\" opens replication for the returning node {} \"{}\"",
                    primary.node_id, primary.node_name, demoted.node_id, demoted.node_name
                ),
            );
        }
        Some(plan)
    }

    /// Standbys that re-attached through `join_secondary` become plain
    /// secondaries once the new primary holds the seat.
    pub(super) fn join_secondary_follow(&self) -> Option<Plan> {
        let primary = self.group.primary()?;
        if !primary.reported_state.is_writable() {
            return None;
        }
        let mut plan = Plan::new();
        for node in self.group.nodes.values() {
            if node.goal_state == ReplicationState::JoinSecondary && node.has_reached_goal() {
                plan.assign(
                    node.node_id,
                    ReplicationState::Secondary,
                    format!(
                        "Node {} \"{}\" follows the new primary node {} \"{}\"",
                        node.node_id, node.node_name, primary.node_id, primary.node_name
                    ),
                );
            }
        }
        if plan.is_empty() { None } else { Some(plan) }
    }

    /// A standby waiting to enter maintenance may do so once the primary has
    /// converged on its own goal (having stopped counting the standby in its
    /// synchronous quorum).
    pub(super) fn maintenance_progress(&self) -> Option<Plan> {
        let waiting = self
            .group
            .nodes
            .values()
            .find(|n| n.goal_state == ReplicationState::WaitMaintenance)?;
        let primary = self.group.primary()?;
        if !primary.has_reached_goal() || !primary.goal_state.is_writable() {
            return None;
        }
        let mut plan = Plan::new();
        plan.assign(
            waiting.node_id,
            ReplicationState::Maintenance,
            format!(
                "Node {} \"{}\" is now in maintenance",
                waiting.node_id, waiting.node_name
            ),
        );
        Some(plan)
    }

    /// A group reduced to one node degenerates to `single`: no replication,
    /// no synchronous quorum. Never applied to a zero-priority node that is
    /// not already writable, so a parked read-replica is not auto-promoted.
    pub(super) fn single_degeneration(&self) -> Option<Plan> {
        if self.group.member_count() != 1 {
            return None;
        }
        let node = self
            .group
            .nodes
            .values()
            .find(|n| n.goal_state != ReplicationState::Dropped)?;
        if node.goal_state == ReplicationState::Single || node.goal_state.is_in_maintenance() {
            return None;
        }
        if !node.is_failover_candidate() && !node.goal_state.is_writable() {
            return None;
        }
        let mut plan = Plan::new();
        plan.assign(
            node.node_id,
            ReplicationState::Single,
            format!(
                "Node {} \"{}\" is the only node left in group {}",
                node.node_id, node.node_name, self.group.group_id
            ),
        );
        Some(plan)
    }

    /// Walks a registering standby and its primary toward an open
    /// replication connection: the primary opens a slot (`wait_primary` or
    /// `join_primary`), then the standby starts its base backup.
    pub(super) fn standby_joins(&self) -> Option<Plan> {
        let primary = self.group.primary()?;
        let joining: Vec<_> = self
            .group
            .nodes
            .values()
            .filter(|n| n.goal_state == ReplicationState::WaitStandby)
            .collect();
        if joining.is_empty() {
            return None;
        }

        let mut plan = Plan::new();
        match primary.goal_state {
            ReplicationState::Single => {
                plan.assign(
                    primary.node_id,
                    ReplicationState::WaitPrimary,
                    format!(
                        "Node {} \"{}\" opens replication for its first standby",
                        primary.node_id, primary.node_name
                    ),
                );
                return Some(plan);
            }
            ReplicationState::Primary => {
                plan.assign(
                    primary.node_id,
                    ReplicationState::JoinPrimary,
                    format!(
                        "Node {} \"{}\" opens replication for a joining standby",
                        primary.node_id, primary.node_name
                    ),
                );
                return Some(plan);
            }
            _ => {}
        }

        if matches!(
            primary.reported_state,
            ReplicationState::WaitPrimary | ReplicationState::JoinPrimary
        ) {
            for standby in joining {
                if standby.has_reached_goal() {
                    plan.assign(
                        standby.node_id,
                        ReplicationState::CatchingUp,
                        format!(
                            "Node {} \"{}\" may now start streaming from node {} \"{}\"",
                            standby.node_id,
                            standby.node_name,
                            primary.node_id,
                            primary.node_name
                        ),
                    );
                }
            }
        }
        if plan.is_empty() { None } else { Some(plan) }
    }

    /// A healthy standby that caught up to within `enable_sync_wal_threshold`
    /// of the primary becomes a secondary, eligible for the synchronous
    /// quorum.
    pub(super) fn catchingup_to_secondary(&self) -> Option<Plan> {
        let primary = self.group.primary()?;
        if !matches!(
            primary.goal_state,
            ReplicationState::WaitPrimary
                | ReplicationState::JoinPrimary
                | ReplicationState::Primary
                | ReplicationState::ApplySettings
        ) || !primary.reported_lsn.is_valid()
        {
            return None;
        }

        let mut plan = Plan::new();
        for node in self.group.nodes.values() {
            if node.goal_state == ReplicationState::CatchingUp
                && node.has_reached_goal()
                && self.oracle.is_healthy(node)
                && node.reported_lsn.is_valid()
                && primary.reported_lsn.distance(node.reported_lsn)
                    <= self.config.enable_sync_wal_threshold
            {
                plan.assign(
                    node.node_id,
                    ReplicationState::Secondary,
                    format!(
                        "Node {} \"{}\" caught up to {} and becomes a secondary",
                        node.node_id, node.node_name, node.reported_lsn
                    ),
                );
            }
        }
        if plan.is_empty() { None } else { Some(plan) }
    }

    /// An unhealthy secondary leaves the synchronous quorum. When that was
    /// the last healthy quorum member and the formation tolerates it
    /// (`number_sync_standbys = 0`), the primary falls back to
    /// `wait_primary` so writes keep flowing.
    pub(super) fn secondary_health_watch(&self) -> Option<Plan> {
        let primary = self.group.primary()?;
        let failing: Vec<_> = self
            .group
            .nodes
            .values()
            .filter(|n| {
                n.goal_state == ReplicationState::Secondary
                    && self.oracle.is_unhealthy(n, self.now)
            })
            .collect();
        if failing.is_empty() {
            return None;
        }

        let mut plan = Plan::new();
        for node in &failing {
            plan.assign(
                node.node_id,
                ReplicationState::CatchingUp,
                format!(
                    "Node {} \"{}\" became unhealthy and leaves the synchronous quorum",
                    node.node_id, node.node_name
                ),
            );
        }

        let healthy_sync_left = self
            .group
            .nodes
            .values()
            .any(|n| n.is_sync_standby() && self.oracle.is_healthy(n));
        if !healthy_sync_left
            && self.formation.number_sync_standbys == 0
            && primary.goal_state == ReplicationState::Primary
        {
            plan.assign(
                primary.node_id,
                ReplicationState::WaitPrimary,
                format!(
                    "Node {} \"{}\" disables synchronous replication to keep accepting writes",
                    primary.node_id, primary.node_name
                ),
            );
        }
        Some(plan)
    }

    /// The primary's own convergence: settings applied, or the synchronous
    /// quorum complete again.
    pub(super) fn primary_convergence(&self) -> Option<Plan> {
        let primary = self.group.primary()?;
        let mut plan = Plan::new();

        if primary.goal_state == ReplicationState::ApplySettings && primary.has_reached_goal() {
            plan.assign(
                primary.node_id,
                ReplicationState::Primary,
                format!(
                    "Node {} \"{}\" applied the new replication settings",
                    primary.node_id, primary.node_name
                ),
            );
            return Some(plan);
        }

        if matches!(
            primary.goal_state,
            ReplicationState::WaitPrimary | ReplicationState::JoinPrimary
        ) && primary.has_reached_goal()
        {
            let has_ready_secondary = self.group.nodes.values().any(|n| {
                n.goal_state == ReplicationState::Secondary
                    && n.has_reached_goal()
                    && self.oracle.is_healthy(n)
            });
            let still_converging = self.group.nodes.values().any(|n| {
                matches!(
                    n.goal_state,
                    ReplicationState::WaitStandby | ReplicationState::CatchingUp
                ) && self.oracle.is_healthy(n)
            });
            if has_ready_secondary && !still_converging {
                plan.assign(
                    primary.node_id,
                    ReplicationState::Primary,
                    format!(
                        "Node {} \"{}\" has a synchronous standby again",
                        primary.node_id, primary.node_name
                    ),
                );
                return Some(plan);
            }
        }
        None
    }
}
