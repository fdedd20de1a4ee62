// src/core/fsm/failover.rs

//! Failover orchestration rules: detecting an unhealthy primary, collecting
//! WAL positions, electing and promoting a candidate, and cleaning up the
//! stragglers once a new primary has taken over.

use super::selector::{self, Selection};
use super::{GroupFsm, Plan};
use crate::core::metadata::Node;
use crate::core::metrics;
use crate::core::state::ReplicationState;

impl GroupFsm<'_> {
    /// Drives a candidate that has already been picked through
    /// `fast_forward` / `prepare_promotion` / `stop_replication` and up to
    /// `wait_primary`, demoting the old primary in lock step. Also returns a
    /// stuck candidate to `report_lsn` so the next heartbeat re-enters the
    /// election.
    pub(super) fn promotion_progress(&self) -> Option<Plan> {
        let candidate = self
            .group
            .nodes
            .values()
            .find(|n| n.goal_state.is_being_promoted())?;
        let primary = self.group.primary();
        let mut plan = Plan::new();

        if !self.oracle.is_reporting(candidate, self.now) {
            plan.assign(
                candidate.node_id,
                ReplicationState::ReportLsn,
                format!(
                    "Candidate node {} \"{}\" stopped reporting during promotion; restarting the election",
                    candidate.node_id, candidate.node_name
                ),
            );
            return Some(plan);
        }

        match candidate.goal_state {
            ReplicationState::FastForward => {
                if candidate.has_reached_goal() {
                    plan.assign(
                        candidate.node_id,
                        ReplicationState::PreparePromotion,
                        format!(
                            "Node {} \"{}\" fetched the missing WAL and may now be promoted",
                            candidate.node_id, candidate.node_name
                        ),
                    );
                }
            }
            ReplicationState::PreparePromotion => {
                if !candidate.has_reached_goal() {
                    return None;
                }
                match primary {
                    Some(p) if p.goal_state == ReplicationState::PrepareMaintenance => {
                        if p.has_reached_goal() {
                            plan.assign(
                                candidate.node_id,
                                ReplicationState::StopReplication,
                                format!(
                                    "Promoting node {} \"{}\" while node {} \"{}\" enters maintenance",
                                    candidate.node_id,
                                    candidate.node_name,
                                    p.node_id,
                                    p.node_name
                                ),
                            );
                            plan.assign(
                                p.node_id,
                                ReplicationState::Maintenance,
                                format!(
                                    "Node {} \"{}\" is now in maintenance",
                                    p.node_id, p.node_name
                                ),
                            );
                        }
                    }
                    Some(p) => {
                        plan.assign(
                            candidate.node_id,
                            ReplicationState::StopReplication,
                            format!(
                                "Node {} \"{}\" is ready to be promoted, stopping replication",
                                candidate.node_id, candidate.node_name
                            ),
                        );
                        plan.assign(
                            p.node_id,
                            ReplicationState::DemoteTimeout,
                            format!(
                                "Demoting node {} \"{}\" for node {} \"{}\" to take over",
                                p.node_id, p.node_name, candidate.node_id, candidate.node_name
                            ),
                        );
                    }
                    None => {
                        plan.assign(
                            candidate.node_id,
                            ReplicationState::StopReplication,
                            format!(
                                "Node {} \"{}\" is ready to be promoted, stopping replication",
                                candidate.node_id, candidate.node_name
                            ),
                        );
                    }
                }
            }
            ReplicationState::StopReplication => {
                if !candidate.has_reached_goal() {
                    return None;
                }
                let primary_cleared = match primary {
                    None => true,
                    Some(p) if p.goal_state.is_in_maintenance() => true,
                    Some(p) if p.goal_state == ReplicationState::DemoteTimeout => {
                        p.has_reached_goal() || self.oracle.drain_expired(p, self.now)
                    }
                    Some(_) => false,
                };
                if primary_cleared {
                    plan.assign(
                        candidate.node_id,
                        ReplicationState::WaitPrimary,
                        format!(
                            "Promoting node {} \"{}\" to be the new primary of group {}",
                            candidate.node_id, candidate.node_name, self.group.group_id
                        ),
                    );
                    if let Some(p) = primary
                        && p.goal_state == ReplicationState::DemoteTimeout
                    {
                        plan.assign(
                            p.node_id,
                            ReplicationState::Demoted,
                            format!("Node {} \"{}\" is demoted", p.node_id, p.node_name),
                        );
                    }
                    for node in self.group.nodes.values() {
                        if node.priority_boost != 0 {
                            plan.clear_boost(node.node_id);
                        }
                    }
                }
            }
            _ => unreachable!("goal state filtered by is_being_promoted"),
        }

        if plan.is_empty() { None } else { Some(plan) }
    }

    /// Once the elected candidate is on its way (past `fast_forward`), every
    /// other node still publishing its WAL position re-attaches to the new
    /// primary instead.
    pub(super) fn cascade_to_join_secondary(&self) -> Option<Plan> {
        let candidate = self.group.nodes.values().find(|n| {
            matches!(
                n.goal_state,
                ReplicationState::PreparePromotion | ReplicationState::StopReplication
            )
        })?;
        let mut plan = Plan::new();
        for node in self.group.nodes.values() {
            if node.goal_state == ReplicationState::ReportLsn {
                plan.assign(
                    node.node_id,
                    ReplicationState::JoinSecondary,
                    format!(
                        "Node {} \"{}\" rejoins as a standby of node {} \"{}\"",
                        node.node_id, node.node_name, candidate.node_id, candidate.node_name
                    ),
                );
            }
        }
        if plan.is_empty() { None } else { Some(plan) }
    }

    /// Runs the election over nodes assigned `report_lsn`: waits for every
    /// expected participant, then asks the selector for a promotion target.
    /// The data-loss guard refusal and the zero-candidate park both surface
    /// as events without transitions, re-evaluated on each heartbeat.
    pub(super) fn election(&self) -> Option<Plan> {
        let expected: Vec<&Node> = self
            .group
            .nodes
            .values()
            .filter(|n| n.goal_state == ReplicationState::ReportLsn)
            .collect();
        if expected.is_empty() {
            return None;
        }
        if self
            .group
            .nodes
            .values()
            .any(|n| n.goal_state.is_being_promoted())
        {
            return None;
        }

        // Elections only run while the primary seat is being vacated. A
        // parked report_lsn node next to an established primary is released
        // by `release_parked_standbys` instead.
        let primary = self.group.primary();
        if let Some(p) = primary
            && !matches!(
                p.goal_state,
                ReplicationState::Draining
                    | ReplicationState::DemoteTimeout
                    | ReplicationState::PrepareMaintenance
            )
        {
            return None;
        }

        let mut plan = Plan::new();

        let missing: Vec<&Node> = expected
            .iter()
            .copied()
            .filter(|n| !n.has_reached_goal() && self.oracle.is_reporting(n, self.now))
            .collect();
        if !missing.is_empty() {
            let names: Vec<String> = missing.iter().map(|n| n.node_name.clone()).collect();
            plan.note(
                missing[0].node_id,
                format!(
                    "Failover of group {} is waiting for WAL positions from: {}",
                    self.group.group_id,
                    names.join(", ")
                ),
            );
            return Some(plan);
        }

        let participants: Vec<&Node> = expected
            .iter()
            .copied()
            .filter(|n| n.has_reached_goal())
            .collect();
        if participants.is_empty() {
            return None;
        }

        let primary_lsn = primary.map(|p| p.reported_lsn).filter(|lsn| lsn.is_valid());
        let selection = selector::select_candidate(
            &participants,
            |n| self.oracle.is_healthy(n),
            primary_lsn,
            self.config.promote_wal_threshold,
        );

        match selection {
            Selection::DataLossGuard {
                most_advanced,
                primary_lsn,
            } => {
                metrics::PROMOTIONS_REFUSED_TOTAL.inc();
                plan.note(
                    participants[0].node_id,
                    format!(
                        "Refusing to promote: the most advanced standby is at {most_advanced}, \
                         more than {} bytes behind the primary at {primary_lsn}; \
                         bring the primary back or raise promote_wal_threshold",
                        self.config.promote_wal_threshold
                    ),
                );
                Some(plan)
            }
            Selection::NoCandidate => {
                plan.note(
                    participants[0].node_id,
                    format!(
                        "Group {} has no failover candidate; waiting for an operator-driven promotion",
                        self.group.group_id
                    ),
                );
                Some(plan)
            }
            Selection::Selected(candidate) => {
                let most_advanced_lsn = participants
                    .iter()
                    .map(|n| n.reported_lsn)
                    .max()
                    .unwrap_or_default();
                let advanced_peer = participants.iter().copied().find(|n| {
                    n.reported_lsn == most_advanced_lsn && self.oracle.is_healthy(n)
                });
                if candidate.reported_lsn < most_advanced_lsn
                    && let Some(peer) = advanced_peer
                    && peer.node_id != candidate.node_id
                {
                    plan.assign(
                        candidate.node_id,
                        ReplicationState::FastForward,
                        format!(
                            "Node {} \"{}\" wins the election and fast-forwards missing WAL from node {} \"{}\"",
                            candidate.node_id, candidate.node_name, peer.node_id, peer.node_name
                        ),
                    );
                } else {
                    plan.assign(
                        candidate.node_id,
                        ReplicationState::PreparePromotion,
                        format!(
                            "Node {} \"{}\" wins the election and prepares its promotion",
                            candidate.node_id, candidate.node_name
                        ),
                    );
                }
                Some(plan)
            }
        }
    }

    /// Detects a failed (or deliberately failing-over) primary and starts
    /// the demotion: the primary drains, and the standbys either promote
    /// directly (two-node group) or publish their WAL positions first.
    pub(super) fn failover_trigger(&self) -> Option<Plan> {
        let primary = self.group.primary()?;
        if matches!(
            primary.goal_state,
            ReplicationState::Draining
                | ReplicationState::DemoteTimeout
                | ReplicationState::PrepareMaintenance
        ) || primary.goal_state == ReplicationState::Single
        {
            return None;
        }
        if !self.oracle.is_unhealthy(primary, self.now) {
            return None;
        }

        let actives: Vec<&Node> = self.group.active_standbys().collect();
        if actives.is_empty() {
            return None;
        }

        let mut plan = Plan::new();
        let candidates: Vec<&&Node> = actives
            .iter()
            .filter(|n| n.is_failover_candidate())
            .collect();

        if candidates.is_empty() {
            // Zero-candidate groups stop writes and park every standby in
            // report_lsn, waiting for an operator-driven promotion. A node
            // with candidate_priority 0 is never auto-elected.
            self.drain_primary_into_report_lsn(&mut plan, primary, &actives);
            plan.note(
                primary.node_id,
                format!(
                    "Group {} lost its primary and has no failover candidate; \
                     waiting for an operator-driven promotion",
                    self.group.group_id
                ),
            );
            return Some(plan);
        }

        if actives.len() == 1 {
            let standby = actives[0];
            if standby.goal_state == ReplicationState::Secondary
                && self.oracle.is_healthy(standby)
                && standby.is_failover_candidate()
                && primary.reported_lsn.distance(standby.reported_lsn)
                    <= self.config.promote_wal_threshold
            {
                plan.assign(
                    standby.node_id,
                    ReplicationState::PreparePromotion,
                    format!(
                        "Failing over to node {} \"{}\" after node {} \"{}\" became unhealthy",
                        standby.node_id, standby.node_name, primary.node_id, primary.node_name
                    ),
                );
                plan.assign(
                    primary.node_id,
                    ReplicationState::Draining,
                    format!(
                        "Draining node {} \"{}\" ahead of its demotion",
                        primary.node_id, primary.node_name
                    ),
                );
                return Some(plan);
            }
            // The sole standby is not promotable right now; wait for it to
            // catch up or for the primary to come back.
            return None;
        }

        self.drain_primary_into_report_lsn(&mut plan, primary, &actives);
        Some(plan)
    }

    /// Shared start of a multi-standby failover: the primary drains, and
    /// every standby that is still alive is asked for its WAL position.
    /// Standbys that neither report nor pass health checks are skipped.
    fn drain_primary_into_report_lsn(&self, plan: &mut Plan, primary: &Node, actives: &[&Node]) {
        plan.assign(
            primary.node_id,
            ReplicationState::Draining,
            format!(
                "Draining node {} \"{}\" after it became unhealthy",
                primary.node_id, primary.node_name
            ),
        );
        for standby in actives {
            if self.oracle.is_reporting(standby, self.now) || self.oracle.is_healthy(standby) {
                plan.assign(
                    standby.node_id,
                    ReplicationState::ReportLsn,
                    format!(
                        "Asking node {} \"{}\" for its last received WAL position",
                        standby.node_id, standby.node_name
                    ),
                );
            }
        }
    }

    /// A node parked in `report_lsn` next to an established primary (for
    /// instance after leaving maintenance once a failover had already
    /// finished) goes back to catching up.
    pub(super) fn release_parked_standbys(&self) -> Option<Plan> {
        let primary = self.group.primary()?;
        if !matches!(
            primary.goal_state,
            ReplicationState::Single
                | ReplicationState::WaitPrimary
                | ReplicationState::Primary
                | ReplicationState::JoinPrimary
                | ReplicationState::ApplySettings
        ) {
            return None;
        }
        if self
            .group
            .nodes
            .values()
            .any(|n| n.goal_state.is_being_promoted())
        {
            return None;
        }

        let mut plan = Plan::new();
        for node in self.group.nodes.values() {
            if node.goal_state == ReplicationState::ReportLsn {
                plan.assign(
                    node.node_id,
                    ReplicationState::CatchingUp,
                    format!(
                        "No failover is in progress; node {} \"{}\" goes back to catching up",
                        node.node_id, node.node_name
                    ),
                );
            }
        }
        if plan.is_empty() { None } else { Some(plan) }
    }
}
