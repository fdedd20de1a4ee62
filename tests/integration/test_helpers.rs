// tests/integration/test_helpers.rs

//! Test helpers and utilities for driving a monitor end-to-end.

use std::sync::Arc;
use steward::Monitor;
use steward::config::CoreConfig;
use steward::core::ReplicationState;
use steward::core::monitor::node_active::{Assignment, NodeActiveParams};
use steward::core::monitor::registration::{RegisterParams, RegisterResult};
use steward::core::types::{DEFAULT_CLUSTER_TAG, Lsn, NodeHealth, NodeKind, SyncState};
use tracing_subscriber::EnvFilter;

pub const FORMATION: &str = "default";
pub const DBNAME: &str = "app";
pub const SYS_ID: u64 = 7_212_638_861_975_021_980;

/// A monitor plus the bookkeeping to drive keepers against it from tests.
pub struct TestCluster {
    pub monitor: Arc<Monitor>,
}

impl TestCluster {
    pub fn new() -> Self {
        Self::with_config(CoreConfig::default())
    }

    /// Most failover tests want the demotion deadline to expire right away
    /// instead of sleeping through a 30s drain.
    pub fn with_instant_drain() -> Self {
        Self::with_config(CoreConfig {
            drain_timeout: std::time::Duration::ZERO,
            ..CoreConfig::default()
        })
    }

    pub fn with_config(config: CoreConfig) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("warn"))
            .with_test_writer()
            .try_init();
        Self {
            monitor: Monitor::new(config),
        }
    }

    /// Registers a node with the common defaults; `host` doubles as the
    /// node name to keep scenarios readable.
    pub fn register(&self, host: &str, priority: i32, quorum: bool) -> RegisterResult {
        self.try_register(host, priority, quorum)
            .expect("registration should succeed")
    }

    pub fn try_register(
        &self,
        host: &str,
        priority: i32,
        quorum: bool,
    ) -> Result<RegisterResult, steward::core::MonitorError> {
        self.monitor.register_node(RegisterParams {
            formation: FORMATION.to_string(),
            host: host.to_string(),
            port: 5432,
            dbname: DBNAME.to_string(),
            name: host.to_string(),
            sys_identifier: SYS_ID,
            desired_node_id: -1,
            desired_group_id: -1,
            initial_state: ReplicationState::Init,
            node_kind: NodeKind::Standalone,
            candidate_priority: priority,
            replication_quorum: quorum,
            cluster_tag: DEFAULT_CLUSTER_TAG.to_string(),
        })
    }

    /// One keeper heartbeat with a healthy Postgres.
    pub fn report(&self, node_id: i64, state: ReplicationState, lsn: &str) -> Assignment {
        self.report_pg(node_id, state, lsn, true)
    }

    /// One keeper heartbeat with explicit Postgres liveness.
    pub fn report_pg(
        &self,
        node_id: i64,
        state: ReplicationState,
        lsn: &str,
        pg_is_running: bool,
    ) -> Assignment {
        self.monitor
            .node_active(&NodeActiveParams {
                formation: FORMATION.to_string(),
                node_id,
                group_id: 0,
                reported_state: state,
                pg_is_running,
                tli: 1,
                lsn: lsn.parse::<Lsn>().expect("test LSNs parse"),
                sync_state: SyncState::Quorum,
            })
            .expect("node_active should succeed")
    }

    /// Marks a node healthy, the way the external prober would.
    pub fn probe_good(&self, host: &str) {
        self.monitor
            .report_node_health(host, 5432, NodeHealth::Good)
            .expect("health report should succeed");
    }

    /// The goal state the monitor currently assigns to a node.
    pub fn goal_of(&self, node_id: i64) -> ReplicationState {
        self.monitor
            .current_state(FORMATION, None)
            .expect("current_state should succeed")
            .into_iter()
            .find(|row| row.node_id == node_id)
            .map(|row| row.goal_state)
            .expect("node should exist")
    }

    /// The candidate priority currently stored for a node.
    pub fn priority_of(&self, node_id: i64) -> i32 {
        self.monitor
            .current_state(FORMATION, None)
            .expect("current_state should succeed")
            .into_iter()
            .find(|row| row.node_id == node_id)
            .map(|row| row.candidate_priority)
            .expect("node should exist")
    }

    pub fn sync_names(&self) -> String {
        self.monitor
            .synchronous_standby_names(FORMATION, 0)
            .expect("synchronous_standby_names should succeed")
    }

    /// Builds a converged primary/secondary pair: ends with "a" in
    /// `primary` and "b" in `secondary`.
    pub fn converged_pair(&self) -> (RegisterResult, RegisterResult) {
        let a = self.register("a", 50, true);
        assert_eq!(a.goal_state, ReplicationState::Single);
        self.probe_good("a");
        self.report(a.node_id, ReplicationState::Single, "0/1000000");

        let b = self.register("b", 50, true);
        assert_eq!(b.goal_state, ReplicationState::WaitStandby);
        self.probe_good("b");
        assert_eq!(self.goal_of(a.node_id), ReplicationState::WaitPrimary);

        self.report(a.node_id, ReplicationState::WaitPrimary, "0/1000000");
        self.report(b.node_id, ReplicationState::WaitStandby, "0/0");
        assert_eq!(self.goal_of(b.node_id), ReplicationState::CatchingUp);

        self.report(b.node_id, ReplicationState::CatchingUp, "0/1000000");
        assert_eq!(self.goal_of(b.node_id), ReplicationState::Secondary);

        self.report(b.node_id, ReplicationState::Secondary, "0/1000000");
        assert_eq!(self.goal_of(a.node_id), ReplicationState::Primary);
        self.report(a.node_id, ReplicationState::Primary, "0/1000000");

        (a, b)
    }

    /// Extends a converged pair with one more secondary named `host`.
    pub fn add_secondary(&self, primary_id: i64, host: &str, priority: i32) -> RegisterResult {
        let node = self.register(host, priority, true);
        self.probe_good(host);
        assert_eq!(node.goal_state, ReplicationState::WaitStandby);
        assert_eq!(self.goal_of(primary_id), ReplicationState::JoinPrimary);

        self.report(primary_id, ReplicationState::JoinPrimary, "0/1000000");
        self.report(node.node_id, ReplicationState::WaitStandby, "0/0");
        assert_eq!(self.goal_of(node.node_id), ReplicationState::CatchingUp);
        self.report(node.node_id, ReplicationState::CatchingUp, "0/1000000");
        assert_eq!(self.goal_of(node.node_id), ReplicationState::Secondary);
        self.report(node.node_id, ReplicationState::Secondary, "0/1000000");
        assert_eq!(self.goal_of(primary_id), ReplicationState::Primary);
        self.report(primary_id, ReplicationState::Primary, "0/1000000");

        node
    }

    /// Builds a three-node group: "a" primary, "b" and "c" secondaries.
    pub fn converged_trio(&self) -> (RegisterResult, RegisterResult, RegisterResult) {
        let (a, b) = self.converged_pair();
        let c = self.add_secondary(a.node_id, "c", 50);
        (a, b, c)
    }
}

impl Default for TestCluster {
    fn default() -> Self {
        Self::new()
    }
}
