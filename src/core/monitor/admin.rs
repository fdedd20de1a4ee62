// src/core/monitor/admin.rs

//! Administrative operations: operator-driven failover and promotion,
//! maintenance windows, replication-settings changes, node removal, and
//! formation management. Every operation takes the formation lock
//! exclusively, enters the FSM through the same plan machinery as the
//! heartbeats, and is atomic: any error leaves the metadata untouched.

use super::Monitor;
use crate::core::errors::MonitorError;
use crate::core::fsm::Plan;
use crate::core::metadata::{
    Formation, Group, MAX_CANDIDATE_PRIORITY, Node, NodeLocation,
};
use crate::core::metrics;
use crate::core::state::ReplicationState;
use crate::core::types::{FormationKind, NodeHealth};
use std::time::Instant;
use tracing::{info, warn};

/// Boost folded into the candidate priority of a `perform_promotion` target.
/// One more than the failover penalty, so an explicitly named target always
/// outranks every implicitly boosted competitor.
pub const PROMOTION_PRIORITY_BOOST: i32 = 101;

/// Penalty folded into the outgoing primary's candidate priority during
/// `perform_failover`, so it does not win its own succession.
pub const FAILOVER_PRIORITY_PENALTY: i32 = 100;

impl Monitor {
    /// Creates a formation explicitly, ahead of any registration.
    pub fn create_formation(
        &self,
        formation_id: &str,
        kind: FormationKind,
        dbname: &str,
        opt_secondary: bool,
        number_sync_standbys: i32,
    ) -> Result<bool, MonitorError> {
        if number_sync_standbys < 0 {
            return Err(MonitorError::InvalidParameterValue(
                "number_sync_standbys cannot be negative".to_string(),
            ));
        }
        self.store().insert_formation(Formation {
            formation_id: formation_id.to_string(),
            kind,
            dbname: dbname.to_string(),
            opt_secondary,
            number_sync_standbys,
        })?;
        info!("Created formation \"{formation_id}\" of kind {kind} for database \"{dbname}\"");
        Ok(true)
    }

    /// Drops a formation; refused while any node is still registered.
    pub fn drop_formation(&self, formation_id: &str) -> Result<bool, MonitorError> {
        let formation_state = self.store().expect_formation(formation_id)?;
        let _meta = formation_state.meta.write();
        if formation_state.node_count() > 0 {
            return Err(MonitorError::ObjectInUse(format!(
                "formation \"{formation_id}\" still has {} registered nodes",
                formation_state.node_count()
            )));
        }
        drop(_meta);
        self.store().remove_formation(formation_id);
        info!("Dropped formation \"{formation_id}\"");
        Ok(true)
    }

    /// Entry point for the external health prober.
    pub fn report_node_health(
        &self,
        host: &str,
        port: u16,
        health: NodeHealth,
    ) -> Result<bool, MonitorError> {
        let location = self.store().locate_node_by_addr(host, port).ok_or_else(|| {
            MonitorError::UndefinedObject(format!("node at {host}:{port}"))
        })?;
        let meta = location.formation.meta.read().clone();
        let mut group = location.group.lock();
        let now = Instant::now();

        // Stage the verdict, decide, then commit: a verdict change can start
        // (or call off) a failover right away, and that decision must be
        // atomic with recording the verdict.
        let mut staged = group.clone();
        let staged_node = staged
            .nodes
            .get_mut(&location.node_id)
            .expect("located node is present");
        let changed = staged_node.health != health;
        staged_node.health = health;
        staged_node.health_check_time = now;
        let plan = if changed {
            self.decide(&meta, &staged)?
        } else {
            Plan::new()
        };

        let node = group
            .nodes
            .get_mut(&location.node_id)
            .expect("located node is present");
        node.health = health;
        node.health_check_time = now;
        if changed {
            let description = format!(
                "Health of node {} \"{}\" ({}) is now {}",
                node.node_id,
                node.node_name,
                node.addr(),
                health
            );
            info!("{description}");
            let verdict = self.oracle().classify(node, now);
            self.events().append(node, verdict, &description);
            self.apply_plan(&mut group, &plan);
        }
        Ok(true)
    }

    /// Orchestrates a failover of the given group, healthy primary or not.
    pub fn perform_failover(&self, formation_id: &str, group_id: i32) -> Result<(), MonitorError> {
        let formation_state = self.store().expect_formation(formation_id)?;
        let _meta = formation_state.meta.write();
        let group_arc = formation_state.existing_group(group_id).ok_or_else(|| {
            MonitorError::UndefinedObject(format!(
                "group {group_id} in formation \"{formation_id}\""
            ))
        })?;
        let mut group = group_arc.lock();
        let (primary_id, actives) = validate_failover(&group)?;
        self.start_failover(&mut group, primary_id, &actives);
        Ok(())
    }

    /// Promotes the named node: a two-node group simply fails over, larger
    /// groups first boost the target so the election cannot pick anyone
    /// else. Returns true when a failover is now in progress.
    pub fn perform_promotion(&self, formation_id: &str, name: &str) -> Result<bool, MonitorError> {
        let location = self
            .store()
            .locate_node_by_name(formation_id, name)
            .ok_or_else(|| {
                MonitorError::UndefinedObject(format!(
                    "node \"{name}\" in formation \"{formation_id}\""
                ))
            })?;
        let meta = location.formation.meta.write().clone();
        let mut group = location.group.lock();

        let (is_primary, is_read_replica, in_maintenance, boosted) = {
            let node = &group.nodes[&location.node_id];
            (
                node.goal_state.holds_primary_seat(),
                node.is_read_replica(),
                node.goal_state.is_in_maintenance(),
                node.priority_boost != 0,
            )
        };
        if is_primary {
            return Err(MonitorError::ObjectNotInPrerequisiteState(format!(
                "node \"{name}\" is already the primary of its group"
            )));
        }
        if is_read_replica {
            return Err(MonitorError::FeatureNotSupported(format!(
                "node \"{name}\" is a read replica and cannot be promoted"
            )));
        }
        if in_maintenance {
            return Err(MonitorError::ObjectNotInPrerequisiteState(format!(
                "node \"{name}\" is in maintenance"
            )));
        }

        if group.failover_in_progress() {
            if group.member_count() == 2 {
                return Err(MonitorError::ObjectNotInPrerequisiteState(format!(
                    "a failover is already in progress for group {}",
                    group.group_id
                )));
            }
            if boosted {
                return Err(MonitorError::ObjectNotInPrerequisiteState(format!(
                    "an election involving node \"{name}\" is already in progress"
                )));
            }
            // The group is already electing (for instance parked in
            // report_lsn with no candidate); the boost alone changes the
            // outcome of the next round.
            self.boost_priority(&mut group, location.node_id, PROMOTION_PRIORITY_BOOST);
            self.run_fsm(&meta, &mut group)?;
            return Ok(true);
        }

        let (primary_id, actives) = validate_failover(&group)?;
        if group.member_count() > 2 {
            if boosted {
                return Err(MonitorError::ObjectNotInPrerequisiteState(format!(
                    "an election involving node \"{name}\" is already in progress"
                )));
            }
            self.boost_priority(&mut group, location.node_id, PROMOTION_PRIORITY_BOOST);
        }
        self.start_failover(&mut group, primary_id, &actives);
        Ok(true)
    }

    /// Demotes the current primary on purpose: the two-node shape promotes
    /// the sole secondary directly, larger groups run a full election with
    /// the outgoing primary penalized so it cannot win its own succession.
    fn start_failover(&self, group: &mut Group, primary_id: i64, actives: &[i64]) {
        let mut plan = Plan::new();
        if actives.len() == 1 {
            let standby = &group.nodes[&actives[0]];
            plan.assign(
                standby.node_id,
                ReplicationState::PreparePromotion,
                format!(
                    "Failing over to node {} \"{}\" at the operator's request",
                    standby.node_id, standby.node_name
                ),
            );
            plan.assign(
                primary_id,
                ReplicationState::Draining,
                "Draining the primary ahead of its demotion".to_string(),
            );
        } else {
            if group.nodes[&primary_id].priority_boost == 0 {
                self.boost_priority(group, primary_id, -FAILOVER_PRIORITY_PENALTY);
            }
            let oracle = self.oracle();
            let now = Instant::now();
            plan.assign(
                primary_id,
                ReplicationState::Draining,
                "Draining the primary at the operator's request".to_string(),
            );
            for id in actives {
                let standby = &group.nodes[id];
                if oracle.is_reporting(standby, now) || oracle.is_healthy(standby) {
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
        self.apply_plan(group, &plan);
    }

    /// Folds a transient boost (or penalty) into a node's priority and
    /// records it so it can be removed once the election settles.
    fn boost_priority(&self, group: &mut Group, node_id: i64, boost: i32) {
        let now = Instant::now();
        let oracle = self.oracle();
        let Some(node) = group.nodes.get_mut(&node_id) else {
            return;
        };
        node.candidate_priority += boost;
        node.priority_boost = boost;
        let description = format!(
            "Candidate priority of node {} \"{}\" is {} for the duration of the election",
            node.node_id, node.node_name, node.candidate_priority
        );
        info!("{description}");
        let verdict = oracle.classify(node, now);
        self.events().append(node, verdict, &description);
    }

    /// Puts a node into maintenance. For a primary this starts a failover
    /// that drains into maintenance instead of a demotion.
    pub fn start_maintenance(&self, node_id: i64) -> Result<bool, MonitorError> {
        let location = self.locate(node_id)?;
        let meta = location.formation.meta.write().clone();
        let mut group = location.group.lock();
        let node = &group.nodes[&node_id];
        let node_name = node.node_name.clone();
        let goal = node.goal_state;

        if goal.is_in_maintenance() {
            return Err(MonitorError::ObjectNotInPrerequisiteState(format!(
                "node {node_id} \"{node_name}\" is already in maintenance"
            )));
        }

        let mut plan = Plan::new();
        if goal.holds_primary_seat() {
            if group.failover_in_progress() {
                return Err(MonitorError::ObjectNotInPrerequisiteState(format!(
                    "a failover is in progress for group {}",
                    group.group_id
                )));
            }
            let actives: Vec<i64> = group.active_standbys().map(|n| n.node_id).collect();
            if actives.is_empty() {
                return Err(MonitorError::ObjectNotInPrerequisiteState(format!(
                    "cannot put node {node_id} \"{node_name}\" in maintenance: \
                     no standby could take over writes"
                )));
            }
            plan.assign(
                node_id,
                ReplicationState::PrepareMaintenance,
                format!("Node {node_id} \"{node_name}\" steps down for maintenance"),
            );
            if actives.len() == 1 {
                let standby = &group.nodes[&actives[0]];
                plan.assign(
                    standby.node_id,
                    ReplicationState::PreparePromotion,
                    format!(
                        "Promoting node {} \"{}\" while the primary enters maintenance",
                        standby.node_id, standby.node_name
                    ),
                );
            } else {
                let oracle = self.oracle();
                let now = Instant::now();
                for id in &actives {
                    let standby = &group.nodes[id];
                    if oracle.is_reporting(standby, now) || oracle.is_healthy(standby) {
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
        } else if matches!(
            goal,
            ReplicationState::Secondary | ReplicationState::CatchingUp
        ) {
            let was_sync_standby = group.nodes[&node_id].is_sync_standby();
            let healthy_sync_others = {
                let oracle = self.oracle();
                group
                    .nodes
                    .values()
                    .filter(|n| n.node_id != node_id && n.is_sync_standby() && oracle.is_healthy(n))
                    .count()
            };
            if was_sync_standby {
                if healthy_sync_others <= meta.number_sync_standbys as usize {
                    warn!(
                        "Putting node {node_id} \"{node_name}\" in maintenance leaves formation \
                         \"{}\" with {healthy_sync_others} healthy synchronous standbys for \
                         number_sync_standbys = {}",
                        meta.formation_id, meta.number_sync_standbys
                    );
                }
                let primary_assignment = group.primary().and_then(|primary| {
                    if primary.goal_state != ReplicationState::Primary {
                        return None;
                    }
                    if healthy_sync_others == 0 && meta.number_sync_standbys == 0 {
                        Some((
                            primary.node_id,
                            ReplicationState::WaitPrimary,
                            format!(
                                "Node {} \"{}\" disables synchronous replication while its \
                                 last synchronous standby is in maintenance",
                                primary.node_id, primary.node_name
                            ),
                        ))
                    } else {
                        Some((
                            primary.node_id,
                            ReplicationState::ApplySettings,
                            format!(
                                "Node {} \"{}\" reloads its replication settings",
                                primary.node_id, primary.node_name
                            ),
                        ))
                    }
                });
                if let Some((id, state, description)) = primary_assignment {
                    plan.assign(id, state, description);
                }
            }
            plan.assign(
                node_id,
                ReplicationState::WaitMaintenance,
                format!("Node {node_id} \"{node_name}\" is waiting to enter maintenance"),
            );
        } else {
            return Err(MonitorError::ObjectNotInPrerequisiteState(format!(
                "node {node_id} \"{node_name}\" is {goal} and cannot enter maintenance"
            )));
        }

        self.apply_plan(&mut group, &plan);
        Ok(true)
    }

    /// Brings a node back from maintenance. The node re-enters through
    /// `report_lsn`: if a failover is running it becomes a participant,
    /// otherwise the next heartbeat sends it back to catching up.
    pub fn stop_maintenance(&self, node_id: i64) -> Result<bool, MonitorError> {
        let location = self.locate(node_id)?;
        let _meta = location.formation.meta.read();
        let mut group = location.group.lock();
        let node = &group.nodes[&node_id];
        if node.goal_state != ReplicationState::Maintenance || !node.has_reached_goal() {
            return Err(MonitorError::ObjectNotInPrerequisiteState(format!(
                "node {} \"{}\" is not in maintenance",
                node.node_id, node.node_name
            )));
        }
        let mut plan = Plan::new();
        plan.assign(
            node_id,
            ReplicationState::ReportLsn,
            format!(
                "Node {} \"{}\" leaves maintenance and checks for an ongoing failover",
                node.node_id, node.node_name
            ),
        );
        self.apply_plan(&mut group, &plan);
        Ok(true)
    }

    /// Changes a node's election weight, then has the primary reload its
    /// replication settings.
    pub fn set_node_candidate_priority(
        &self,
        formation_id: &str,
        name: &str,
        priority: i32,
    ) -> Result<bool, MonitorError> {
        if !(0..=MAX_CANDIDATE_PRIORITY).contains(&priority) {
            return Err(MonitorError::InvalidParameterValue(format!(
                "candidate priority must be between 0 and {MAX_CANDIDATE_PRIORITY}, got {priority}"
            )));
        }
        self.change_replication_setting(formation_id, name, |node| {
            if node.is_read_replica() && priority != 0 {
                return Err(MonitorError::InvalidParameterValue(format!(
                    "node \"{}\" is a read replica and must keep candidate priority 0",
                    node.node_name
                )));
            }
            node.candidate_priority = priority;
            Ok(format!(
                "Candidate priority of node {} \"{}\" is now {priority}",
                node.node_id, node.node_name
            ))
        })
    }

    /// Changes whether a node counts toward the synchronous quorum.
    pub fn set_node_replication_quorum(
        &self,
        formation_id: &str,
        name: &str,
        replication_quorum: bool,
    ) -> Result<bool, MonitorError> {
        let location = self
            .store()
            .locate_node_by_name(formation_id, name)
            .ok_or_else(|| {
                MonitorError::UndefinedObject(format!(
                    "node \"{name}\" in formation \"{formation_id}\""
                ))
            })?;
        // Validate the sync-standby accounting before applying: quorum
        // members must stay numerous enough for number_sync_standbys.
        {
            let meta = location.formation.meta.read();
            let group = location.group.lock();
            if !replication_quorum {
                let remaining = group
                    .nodes
                    .values()
                    .filter(|n| {
                        n.node_id != location.node_id
                            && n.replication_quorum
                            && !n.goal_state.holds_primary_seat()
                            && n.goal_state != ReplicationState::Dropped
                    })
                    .count() as i32;
                if meta.number_sync_standbys > (remaining - 1).max(0) {
                    return Err(MonitorError::InvalidObjectDefinition(format!(
                        "cannot clear replication quorum of node \"{name}\": formation \
                         \"{formation_id}\" requires number_sync_standbys = {} and would \
                         only keep {remaining} quorum standbys; lower number_sync_standbys first",
                        meta.number_sync_standbys
                    )));
                }
            }
        }
        self.change_replication_setting(formation_id, name, |node| {
            node.replication_quorum = replication_quorum;
            Ok(format!(
                "Replication quorum of node {} \"{}\" is now {replication_quorum}",
                node.node_id, node.node_name
            ))
        })
    }

    /// Shared body of the two per-node settings operations: update the
    /// field, record an event, and push the primary through
    /// `apply_settings`. Rejected while the primary is already applying a
    /// previous change, so no update can be lost.
    fn change_replication_setting(
        &self,
        formation_id: &str,
        name: &str,
        update: impl FnOnce(&mut Node) -> Result<String, MonitorError>,
    ) -> Result<bool, MonitorError> {
        let location = self
            .store()
            .locate_node_by_name(formation_id, name)
            .ok_or_else(|| {
                MonitorError::UndefinedObject(format!(
                    "node \"{name}\" in formation \"{formation_id}\""
                ))
            })?;
        let _meta = location.formation.meta.write();
        let mut group = location.group.lock();

        let primary_id = {
            let primary = group.primary();
            if let Some(p) = primary
                && p.goal_state == ReplicationState::ApplySettings
            {
                return Err(MonitorError::ObjectNotInPrerequisiteState(format!(
                    "the primary of group {} is still applying a previous settings change",
                    group.group_id
                )));
            }
            primary
                .filter(|p| p.goal_state == ReplicationState::Primary)
                .map(|p| p.node_id)
        };

        let now = Instant::now();
        let oracle = self.oracle();
        let description = {
            let node = group
                .nodes
                .get_mut(&location.node_id)
                .expect("located node is present");
            if node.priority_boost != 0 {
                return Err(MonitorError::ObjectNotInPrerequisiteState(format!(
                    "an election involving node \"{}\" is in progress",
                    node.node_name
                )));
            }
            update(node)?
        };
        {
            let node = &group.nodes[&location.node_id];
            info!("{description}");
            let verdict = oracle.classify(node, now);
            self.events().append(node, verdict, &description);
        }

        if let Some(primary_id) = primary_id {
            let mut plan = Plan::new();
            let primary = &group.nodes[&primary_id];
            plan.assign(
                primary_id,
                ReplicationState::ApplySettings,
                format!(
                    "Node {} \"{}\" reloads its replication settings",
                    primary.node_id, primary.node_name
                ),
            );
            self.apply_plan(&mut group, &plan);
        }
        Ok(true)
    }

    /// Changes the formation-wide synchronous-standby requirement.
    pub fn set_formation_number_sync_standbys(
        &self,
        formation_id: &str,
        number_sync_standbys: i32,
    ) -> Result<bool, MonitorError> {
        if number_sync_standbys < 0 {
            return Err(MonitorError::InvalidParameterValue(
                "number_sync_standbys cannot be negative".to_string(),
            ));
        }
        let formation_state = self.store().expect_formation(formation_id)?;
        let mut meta = formation_state.meta.write();

        for entry in formation_state.groups.iter() {
            let group = entry.value().lock();
            if group.member_count() < 2 {
                continue;
            }
            let quorum_standbys = group
                .nodes
                .values()
                .filter(|n| {
                    n.replication_quorum
                        && !n.goal_state.holds_primary_seat()
                        && n.goal_state != ReplicationState::Dropped
                })
                .count() as i32;
            if quorum_standbys > 0 && number_sync_standbys > quorum_standbys - 1 {
                return Err(MonitorError::InvalidObjectDefinition(format!(
                    "group {} only has {quorum_standbys} quorum standbys, which supports \
                     number_sync_standbys up to {}",
                    group.group_id,
                    quorum_standbys - 1
                )));
            }
        }

        meta.number_sync_standbys = number_sync_standbys;
        info!(
            "Formation \"{formation_id}\" now requires number_sync_standbys = {number_sync_standbys}"
        );
        drop(meta);

        for entry in formation_state.groups.iter() {
            let mut group = entry.value().lock();
            let assignment = group
                .primary()
                .filter(|p| p.goal_state == ReplicationState::Primary)
                .map(|p| (p.node_id, p.node_name.clone()));
            if let Some((id, name)) = assignment {
                let mut plan = Plan::new();
                plan.assign(
                    id,
                    ReplicationState::ApplySettings,
                    format!("Node {id} \"{name}\" reloads its replication settings"),
                );
                self.apply_plan(&mut group, &plan);
            }
        }
        Ok(true)
    }

    /// Corrects a node's identity fields.
    pub fn update_node_metadata(
        &self,
        node_id: i64,
        name: Option<&str>,
        host: Option<&str>,
        port: Option<u16>,
    ) -> Result<bool, MonitorError> {
        // Uniqueness checks run before this group's lock is taken, so the
        // store-wide scans cannot re-enter it.
        let location = self.locate(node_id)?;
        if let (Some(host), Some(port)) = (host, port)
            && let Some(other) = self.store().locate_node_by_addr(host, port)
            && other.node_id != node_id
        {
            return Err(MonitorError::ObjectInUse(format!(
                "{host}:{port} is already registered as node {}",
                other.node_id
            )));
        }

        let _meta = location.formation.meta.write();
        let mut group = location.group.lock();
        let now = Instant::now();
        let oracle = self.oracle();
        let description = {
            let node = group
                .nodes
                .get_mut(&node_id)
                .expect("located node is present");
            if let Some(name) = name {
                node.node_name = name.to_string();
            }
            if let Some(host) = host {
                node.node_host = host.to_string();
            }
            if let Some(port) = port {
                node.node_port = port;
            }
            format!(
                "Node {} is now \"{}\" at {}",
                node.node_id,
                node.node_name,
                node.addr()
            )
        };
        let node = &group.nodes[&node_id];
        info!("{description}");
        let verdict = oracle.classify(node, now);
        self.events().append(node, verdict, &description);
        Ok(true)
    }

    pub fn remove_node_by_nodeid(&self, node_id: i64, force: bool) -> Result<bool, MonitorError> {
        let location = self.locate(node_id)?;
        self.remove_node(location, force)
    }

    pub fn remove_node_by_host(
        &self,
        host: &str,
        port: u16,
        force: bool,
    ) -> Result<bool, MonitorError> {
        let location = self.store().locate_node_by_addr(host, port).ok_or_else(|| {
            MonitorError::UndefinedObject(format!("node at {host}:{port}"))
        })?;
        self.remove_node(location, force)
    }

    /// Two-phase removal: the first call assigns the terminal `dropped`
    /// goal (and starts a failover when the node was the primary); once the
    /// keeper acknowledges, or right away with `force`, the row is deleted.
    fn remove_node(&self, location: NodeLocation, force: bool) -> Result<bool, MonitorError> {
        let mut meta = location.formation.meta.write();
        let mut group = location.group.lock();
        let node_id = location.node_id;
        let node = &group.nodes[&node_id];

        if node.goal_state == ReplicationState::Dropped {
            if force || node.has_reached_goal() {
                self.delete_row(&mut meta, &mut group, node_id)?;
                return Ok(true);
            }
            // Still waiting for the keeper to acknowledge.
            return Ok(false);
        }

        let was_primary = node.goal_state.holds_primary_seat();
        let was_sync_standby = node.is_sync_standby();
        let mut plan = Plan::new();
        plan.assign(
            node_id,
            ReplicationState::Dropped,
            format!(
                "Node {} \"{}\" is being removed from group {}",
                node.node_id, node.node_name, group.group_id
            ),
        );
        if was_sync_standby
            && let Some(primary) = group.primary()
            && primary.goal_state == ReplicationState::Primary
        {
            plan.assign(
                primary.node_id,
                ReplicationState::ApplySettings,
                format!(
                    "Node {} \"{}\" reloads its replication settings",
                    primary.node_id, primary.node_name
                ),
            );
        }
        if was_primary {
            let oracle = self.oracle();
            let now = Instant::now();
            for standby in group.active_standbys() {
                if oracle.is_reporting(standby, now) || oracle.is_healthy(standby) {
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
        self.apply_plan(&mut group, &plan);

        if force {
            self.delete_row(&mut meta, &mut group, node_id)?;
        }
        Ok(true)
    }

    /// Deletes a row for good, keeps the sync-standby accounting valid, and
    /// lets the group react. The whole step is staged first so a decision
    /// error leaves the row in place.
    fn delete_row(
        &self,
        meta: &mut Formation,
        group: &mut Group,
        node_id: i64,
    ) -> Result<(), MonitorError> {
        let mut staged = group.clone();
        staged.nodes.remove(&node_id).ok_or_else(|| {
            MonitorError::UndefinedObject(format!("node {node_id}"))
        })?;

        // Mirror of the registration auto-bump: never require more sync
        // standbys than can exist.
        let quorum_standbys = staged
            .nodes
            .values()
            .filter(|n| {
                n.replication_quorum
                    && !n.goal_state.holds_primary_seat()
                    && n.goal_state != ReplicationState::Dropped
            })
            .count() as i32;
        let ceiling = (quorum_standbys - 1).max(0);
        let clamp_nss = meta.number_sync_standbys > ceiling;

        let mut staged_meta = meta.clone();
        if clamp_nss {
            staged_meta.number_sync_standbys = ceiling;
        }
        let plan = self.decide(&staged_meta, &staged)?;

        let node = group
            .nodes
            .remove(&node_id)
            .expect("staged removal found the row");
        info!(
            "Removed node {} \"{}\" ({}) from group {} of formation \"{}\"",
            node.node_id,
            node.node_name,
            node.addr(),
            group.group_id,
            meta.formation_id
        );
        metrics::REGISTERED_NODES.dec();

        if clamp_nss {
            meta.number_sync_standbys = ceiling;
            let description = format!(
                "Lowering number_sync_standbys of formation \"{}\" to {ceiling} after \
                 removing node {} \"{}\"",
                meta.formation_id, node.node_id, node.node_name
            );
            info!("{description}");
            if let Some(primary) = group.primary() {
                let verdict = self.oracle().classify(primary, Instant::now());
                self.events().append(primary, verdict, &description);
            }
        }

        self.apply_plan(group, &plan);
        Ok(())
    }

    fn locate(&self, node_id: i64) -> Result<NodeLocation, MonitorError> {
        self.store()
            .locate_node(node_id)
            .ok_or_else(|| MonitorError::UndefinedObject(format!("node {node_id}")))
    }
}

/// Preconditions shared by `perform_failover` and `perform_promotion`: a
/// writable primary, at least one standby to fail over to, and no failover
/// already running. Returns the primary and the standbys to involve.
fn validate_failover(group: &Group) -> Result<(i64, Vec<i64>), MonitorError> {
    if group.failover_in_progress() {
        return Err(MonitorError::ObjectNotInPrerequisiteState(format!(
            "a failover is already in progress for group {}",
            group.group_id
        )));
    }
    let primary = group.primary().ok_or_else(|| {
        MonitorError::ObjectNotInPrerequisiteState(format!(
            "group {} has no primary to fail over from",
            group.group_id
        ))
    })?;
    if primary.goal_state == ReplicationState::Single {
        return Err(MonitorError::ObjectNotInPrerequisiteState(format!(
            "group {} only has one node",
            group.group_id
        )));
    }
    if !primary.goal_state.is_writable() {
        return Err(MonitorError::ObjectNotInPrerequisiteState(format!(
            "the primary of group {} is currently {}",
            group.group_id, primary.goal_state
        )));
    }

    let actives: Vec<i64> = group.active_standbys().map(|n| n.node_id).collect();
    if actives.is_empty() {
        return Err(MonitorError::ObjectNotInPrerequisiteState(format!(
            "group {} has no standby to fail over to",
            group.group_id
        )));
    }
    if actives.len() == 1 {
        let standby = &group.nodes[&actives[0]];
        if standby.goal_state != ReplicationState::Secondary {
            return Err(MonitorError::ObjectNotInPrerequisiteState(format!(
                "node {} \"{}\" is still {}, wait for it to reach secondary",
                standby.node_id, standby.node_name, standby.goal_state
            )));
        }
    }
    Ok((primary.node_id, actives))
}
