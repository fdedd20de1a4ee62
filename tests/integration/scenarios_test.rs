// tests/integration/scenarios_test.rs

//! End-to-end scenarios driven through the public monitor API: group
//! bootstrap, two-node failover, multi-standby failover with the data-loss
//! guard and fast-forward, primary removal, and maintenance re-entry.

use super::test_helpers::{FORMATION, TestCluster};
use steward::core::ReplicationState;

// Scenario: two-node bootstrap ends with a primary, a synchronous
// secondary, and a quorum of one.
#[test]
fn two_node_bootstrap_converges() {
    let cluster = TestCluster::new();

    let first = cluster.register("a", 50, true);
    assert_eq!(first.goal_state, ReplicationState::Single);
    assert_eq!(cluster.sync_names(), "");

    // converged_pair re-registers "a", exercising the idempotent path.
    let (a, b) = cluster.converged_pair();
    assert_eq!(a.node_id, first.node_id);

    assert_eq!(cluster.goal_of(a.node_id), ReplicationState::Primary);
    assert_eq!(cluster.goal_of(b.node_id), ReplicationState::Secondary);
    assert_eq!(
        cluster.sync_names(),
        format!("ANY 1 (steward_standby_{})", b.node_id)
    );
}

// Scenario: the primary of a two-node group dies; the secondary is
// promoted through prepare_promotion / stop_replication / wait_primary,
// and the old primary rejoins as a secondary when it comes back.
#[test]
fn two_node_failover_and_rejoin() {
    let cluster = TestCluster::with_instant_drain();
    let (a, b) = cluster.converged_pair();

    // The keeper reports Postgres down; the monitor starts the failover.
    cluster.report_pg(a.node_id, ReplicationState::Primary, "0/1000000", false);
    assert_eq!(cluster.goal_of(a.node_id), ReplicationState::Draining);
    assert_eq!(cluster.goal_of(b.node_id), ReplicationState::PreparePromotion);

    cluster.report(b.node_id, ReplicationState::PreparePromotion, "0/1000000");
    assert_eq!(cluster.goal_of(a.node_id), ReplicationState::DemoteTimeout);
    assert_eq!(cluster.goal_of(b.node_id), ReplicationState::StopReplication);

    // The dead primary never acknowledges; the drain deadline expires.
    cluster.report(b.node_id, ReplicationState::StopReplication, "0/1000000");
    assert_eq!(cluster.goal_of(a.node_id), ReplicationState::Demoted);
    assert_eq!(cluster.goal_of(b.node_id), ReplicationState::WaitPrimary);

    // The old primary reports back and rejoins as a standby.
    cluster.report(b.node_id, ReplicationState::WaitPrimary, "0/1000000");
    cluster.report(a.node_id, ReplicationState::Demoted, "0/1000000");
    assert_eq!(cluster.goal_of(a.node_id), ReplicationState::CatchingUp);

    cluster.report(a.node_id, ReplicationState::CatchingUp, "0/1000000");
    assert_eq!(cluster.goal_of(a.node_id), ReplicationState::Secondary);
    cluster.report(a.node_id, ReplicationState::Secondary, "0/1000000");
    assert_eq!(cluster.goal_of(b.node_id), ReplicationState::Primary);
}

// Scenario: three nodes, and every standby is too far behind the lost
// primary. The selector refuses to promote and the group waits.
#[test]
fn msf_data_loss_guard_refuses_promotion() {
    let cluster = TestCluster::with_config(steward::config::CoreConfig {
        promote_wal_threshold: 16,
        drain_timeout: std::time::Duration::ZERO,
        ..steward::config::CoreConfig::default()
    });
    let (a, b, c) = cluster.converged_trio();

    cluster.report(a.node_id, ReplicationState::Primary, "0/2000100");
    cluster.report(b.node_id, ReplicationState::Secondary, "0/2000050");
    cluster.report(c.node_id, ReplicationState::Secondary, "0/2000040");

    cluster.report_pg(a.node_id, ReplicationState::Primary, "0/2000100", false);
    assert_eq!(cluster.goal_of(a.node_id), ReplicationState::Draining);
    assert_eq!(cluster.goal_of(b.node_id), ReplicationState::ReportLsn);
    assert_eq!(cluster.goal_of(c.node_id), ReplicationState::ReportLsn);

    cluster.report(b.node_id, ReplicationState::ReportLsn, "0/2000050");
    cluster.report(c.node_id, ReplicationState::ReportLsn, "0/2000040");

    // The most advanced standby is 176 bytes behind for a threshold of 16:
    // nobody is promoted, and the refusal is in the event log.
    assert_eq!(cluster.goal_of(b.node_id), ReplicationState::ReportLsn);
    assert_eq!(cluster.goal_of(c.node_id), ReplicationState::ReportLsn);
    let events = cluster.monitor.last_events(Some(FORMATION), None, 10);
    assert!(
        events
            .iter()
            .any(|e| e.description.contains("Refusing to promote")),
        "expected a data-loss-guard event, got: {:?}",
        events.iter().map(|e| &e.description).collect::<Vec<_>>()
    );
}

// Scenario: the preferred candidate is behind the most advanced standby,
// so it fast-forwards from that standby before being promoted; everyone
// else re-attaches through join_secondary.
#[test]
fn msf_fast_forward_promotes_preferred_candidate() {
    let cluster = TestCluster::with_instant_drain();
    let (a, b, c) = cluster.converged_trio();

    cluster
        .monitor
        .set_node_candidate_priority(FORMATION, "c", 80)
        .unwrap();
    assert_eq!(cluster.goal_of(a.node_id), ReplicationState::ApplySettings);
    cluster.report(a.node_id, ReplicationState::ApplySettings, "0/3000100");
    assert_eq!(cluster.goal_of(a.node_id), ReplicationState::Primary);
    cluster.report(a.node_id, ReplicationState::Primary, "0/3000100");

    cluster.report(b.node_id, ReplicationState::Secondary, "0/3000090");
    cluster.report(c.node_id, ReplicationState::Secondary, "0/3000070");

    cluster.report_pg(a.node_id, ReplicationState::Primary, "0/3000100", false);
    assert_eq!(cluster.goal_of(b.node_id), ReplicationState::ReportLsn);
    assert_eq!(cluster.goal_of(c.node_id), ReplicationState::ReportLsn);

    cluster.report(b.node_id, ReplicationState::ReportLsn, "0/3000090");
    cluster.report(c.node_id, ReplicationState::ReportLsn, "0/3000070");

    // Priority beats WAL position: c wins, but must fetch the missing WAL
    // from b first.
    assert_eq!(cluster.goal_of(c.node_id), ReplicationState::FastForward);

    cluster.report(c.node_id, ReplicationState::FastForward, "0/3000090");
    assert_eq!(cluster.goal_of(c.node_id), ReplicationState::PreparePromotion);

    cluster.report(b.node_id, ReplicationState::ReportLsn, "0/3000090");
    assert_eq!(cluster.goal_of(b.node_id), ReplicationState::JoinSecondary);

    cluster.report(c.node_id, ReplicationState::PreparePromotion, "0/3000090");
    assert_eq!(cluster.goal_of(a.node_id), ReplicationState::DemoteTimeout);
    assert_eq!(cluster.goal_of(c.node_id), ReplicationState::StopReplication);

    cluster.report(c.node_id, ReplicationState::StopReplication, "0/3000090");
    assert_eq!(cluster.goal_of(c.node_id), ReplicationState::WaitPrimary);
    assert_eq!(cluster.goal_of(a.node_id), ReplicationState::Demoted);

    cluster.report(c.node_id, ReplicationState::WaitPrimary, "0/3000090");
    cluster.report(b.node_id, ReplicationState::JoinSecondary, "0/3000090");
    assert_eq!(cluster.goal_of(b.node_id), ReplicationState::Secondary);

    cluster.report(b.node_id, ReplicationState::Secondary, "0/3000090");
    assert_eq!(cluster.goal_of(c.node_id), ReplicationState::Primary);
    assert_eq!(
        cluster.sync_names(),
        format!("ANY 1 (steward_standby_{})", b.node_id)
    );
}

// Scenario: removing the primary is safe: the survivors are asked for
// their WAL positions, the row is deleted once the keeper acknowledges,
// and the failover proceeds on the remaining nodes.
#[test]
fn removing_the_primary_fails_over_survivors() {
    let cluster = TestCluster::with_instant_drain();
    let (a, b, c) = cluster.converged_trio();

    assert!(
        cluster
            .monitor
            .remove_node_by_nodeid(a.node_id, false)
            .unwrap()
    );
    assert_eq!(cluster.goal_of(a.node_id), ReplicationState::Dropped);
    assert_eq!(cluster.goal_of(b.node_id), ReplicationState::ReportLsn);
    assert_eq!(cluster.goal_of(c.node_id), ReplicationState::ReportLsn);

    cluster.report(b.node_id, ReplicationState::ReportLsn, "0/1000000");
    cluster.report(c.node_id, ReplicationState::ReportLsn, "0/1000000");

    // The keeper acknowledges the drop; the second call deletes the row.
    cluster.report(a.node_id, ReplicationState::Dropped, "0/1000000");
    assert!(
        cluster
            .monitor
            .remove_node_by_nodeid(a.node_id, false)
            .unwrap()
    );
    assert!(cluster.monitor.get_other_nodes(b.node_id, None).unwrap().len() == 1);

    // Equal priorities and equal positions: the smallest node id wins.
    assert_eq!(cluster.goal_of(b.node_id), ReplicationState::PreparePromotion);

    cluster.report(b.node_id, ReplicationState::PreparePromotion, "0/1000000");
    cluster.report(b.node_id, ReplicationState::StopReplication, "0/1000000");
    assert_eq!(cluster.goal_of(b.node_id), ReplicationState::WaitPrimary);
}

// Scenario: a node that was in maintenance throughout a failover comes
// back through report_lsn, then catches up with the new primary.
#[test]
fn stop_maintenance_after_failover_reenters_via_report_lsn() {
    let cluster = TestCluster::with_instant_drain();
    let (a, b) = cluster.converged_pair();
    let m = cluster.add_secondary(a.node_id, "m", 50);

    assert!(cluster.monitor.start_maintenance(m.node_id).unwrap());
    assert_eq!(cluster.goal_of(m.node_id), ReplicationState::WaitMaintenance);
    assert_eq!(cluster.goal_of(a.node_id), ReplicationState::ApplySettings);
    cluster.report(a.node_id, ReplicationState::ApplySettings, "0/1000000");
    assert_eq!(cluster.goal_of(a.node_id), ReplicationState::Primary);
    cluster.report(a.node_id, ReplicationState::Primary, "0/1000000");
    assert_eq!(cluster.goal_of(m.node_id), ReplicationState::Maintenance);
    cluster.report(m.node_id, ReplicationState::Maintenance, "0/1000000");

    // Two-node failover while m is in maintenance.
    cluster.report_pg(a.node_id, ReplicationState::Primary, "0/1000000", false);
    assert_eq!(cluster.goal_of(b.node_id), ReplicationState::PreparePromotion);
    assert_eq!(cluster.goal_of(m.node_id), ReplicationState::Maintenance);
    cluster.report(b.node_id, ReplicationState::PreparePromotion, "0/1000000");
    cluster.report(b.node_id, ReplicationState::StopReplication, "0/1000000");
    assert_eq!(cluster.goal_of(b.node_id), ReplicationState::WaitPrimary);
    cluster.report(b.node_id, ReplicationState::WaitPrimary, "0/1000000");

    // Maintenance ends: the node first checks for an ongoing failover.
    assert!(cluster.monitor.stop_maintenance(m.node_id).unwrap());
    assert_eq!(cluster.goal_of(m.node_id), ReplicationState::ReportLsn);

    cluster.report(m.node_id, ReplicationState::ReportLsn, "0/1000000");
    assert_eq!(cluster.goal_of(m.node_id), ReplicationState::CatchingUp);

    cluster.report(m.node_id, ReplicationState::CatchingUp, "0/1000000");
    assert_eq!(cluster.goal_of(m.node_id), ReplicationState::Secondary);
}
