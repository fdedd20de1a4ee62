// tests/property/single_writer_test.rs

//! Property-based test for the core safety guarantee: no schedule of
//! keeper reports and health verdicts ever leaves a group with two
//! writable nodes.

use crate::test_helpers::TestCluster;
use proptest::prelude::*;
use steward::core::ReplicationState;
use steward::core::monitor::node_active::NodeActiveParams;
use steward::core::types::{Lsn, NodeHealth, SyncState};

#[derive(Debug, Clone, Copy)]
enum KeeperOp {
    /// The keeper converged: it reports the currently assigned goal.
    ReachGoal,
    /// The keeper lags: it repeats its previous report.
    RepeatLast,
    /// Postgres died on this node.
    PostgresDown,
    ProbeGood,
    ProbeBad,
}

fn arb_op() -> impl Strategy<Value = KeeperOp> {
    prop_oneof![
        3 => Just(KeeperOp::ReachGoal),
        2 => Just(KeeperOp::RepeatLast),
        1 => Just(KeeperOp::PostgresDown),
        2 => Just(KeeperOp::ProbeGood),
        1 => Just(KeeperOp::ProbeBad),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 500,
        ..ProptestConfig::default()
    })]

    #[test]
    fn no_schedule_produces_two_writable_nodes(
        schedule in prop::collection::vec((0usize..3, arb_op()), 1..80)
    ) {
        let cluster = TestCluster::with_instant_drain();
        let a = cluster.register("a", 50, true);
        cluster.report(a.node_id, ReplicationState::Single, "0/1000000");
        let b = cluster.register("b", 50, true);
        let c = cluster.register("c", 40, true);
        let ids = [a.node_id, b.node_id, c.node_id];
        let hosts = ["a", "b", "c"];

        for &(idx, op) in &schedule {
            let node_id = ids[idx];
            let rows = cluster.monitor.current_state("default", None).unwrap();
            let row = rows.iter().find(|r| r.node_id == node_id).unwrap();
            let (reported_state, pg_is_running) = match op {
                KeeperOp::ReachGoal => (row.goal_state, true),
                KeeperOp::RepeatLast => (row.reported_state, true),
                KeeperOp::PostgresDown => (row.reported_state, false),
                KeeperOp::ProbeGood => {
                    cluster.monitor
                        .report_node_health(hosts[idx], 5432, NodeHealth::Good)
                        .unwrap();
                    continue;
                }
                KeeperOp::ProbeBad => {
                    cluster.monitor
                        .report_node_health(hosts[idx], 5432, NodeHealth::Bad)
                        .unwrap();
                    continue;
                }
            };
            if reported_state == ReplicationState::Unknown
                || reported_state == ReplicationState::Dropped
            {
                continue;
            }

            // The heartbeat must never fail: a failure here means the FSM
            // saw its own metadata violate an invariant.
            cluster.monitor
                .node_active(&NodeActiveParams {
                    formation: "default".to_string(),
                    node_id,
                    group_id: 0,
                    reported_state,
                    pg_is_running,
                    tli: 1,
                    lsn: "0/1000000".parse::<Lsn>().unwrap(),
                    sync_state: SyncState::Quorum,
                })
                .unwrap();

            let rows = cluster.monitor.current_state("default", None).unwrap();
            let writable = rows
                .iter()
                .filter(|r| r.reported_state.is_writable() && r.goal_state.is_writable())
                .count();
            prop_assert!(
                writable <= 1,
                "two writable nodes after {:?}: {:?}",
                op,
                rows.iter()
                    .map(|r| (r.node_id, r.reported_state, r.goal_state))
                    .collect::<Vec<_>>()
            );
        }
    }
}
