// tests/unit_selector_test.rs

//! Unit tests for the candidate selector: election order, the data-loss
//! guard, and the zero-candidate cases.

use std::time::Instant;
use steward::core::fsm::selector::{Selection, candidate_order, select_candidate};
use steward::core::metadata::Node;
use steward::core::state::ReplicationState;
use steward::core::types::{Lsn, NodeKind};

fn participant(node_id: i64, priority: i32, lsn: &str) -> Node {
    let mut node = Node::new(
        node_id,
        "default",
        0,
        format!("node_{node_id}"),
        &format!("db{node_id}"),
        5432,
        7070,
        NodeKind::Standalone,
        ReplicationState::ReportLsn,
        ReplicationState::ReportLsn,
        priority,
        true,
        "default".to_string(),
        Instant::now(),
    );
    node.reported_lsn = lsn.parse::<Lsn>().unwrap();
    node
}

#[test]
fn highest_priority_wins() {
    let a = participant(1, 50, "0/5000");
    let b = participant(2, 80, "0/4000");
    let refs = [&a, &b];
    match select_candidate(&refs, |_| true, None, 16 * 1024 * 1024) {
        Selection::Selected(node) => assert_eq!(node.node_id, 2),
        other => panic!("expected a selection, got {other:?}"),
    }
}

#[test]
fn wal_position_breaks_priority_ties() {
    let a = participant(1, 50, "0/4000");
    let b = participant(2, 50, "0/5000");
    let refs = [&a, &b];
    match select_candidate(&refs, |_| true, None, 16 * 1024 * 1024) {
        Selection::Selected(node) => assert_eq!(node.node_id, 2),
        other => panic!("expected a selection, got {other:?}"),
    }
}

#[test]
fn node_id_breaks_full_ties() {
    let a = participant(7, 50, "0/5000");
    let b = participant(3, 50, "0/5000");
    let refs = [&a, &b];
    match select_candidate(&refs, |_| true, None, 16 * 1024 * 1024) {
        Selection::Selected(node) => assert_eq!(node.node_id, 3),
        other => panic!("expected a selection, got {other:?}"),
    }
}

#[test]
fn unhealthy_participants_are_not_elected() {
    let a = participant(1, 80, "0/5000");
    let b = participant(2, 50, "0/4000");
    let refs = [&a, &b];
    match select_candidate(&refs, |n| n.node_id != 1, None, 16 * 1024 * 1024) {
        Selection::Selected(node) => assert_eq!(node.node_id, 2),
        other => panic!("expected a selection, got {other:?}"),
    }
}

#[test]
fn zero_priority_contributes_wal_but_never_wins() {
    let a = participant(1, 0, "0/9000");
    let b = participant(2, 50, "0/4000");
    let refs = [&a, &b];
    match select_candidate(&refs, |_| true, None, 16 * 1024 * 1024) {
        Selection::Selected(node) => assert_eq!(node.node_id, 2),
        other => panic!("expected a selection, got {other:?}"),
    }

    let only_zero = [&a];
    assert_eq!(
        select_candidate(&only_zero, |_| true, None, 16 * 1024 * 1024),
        Selection::NoCandidate
    );
}

#[test]
fn data_loss_guard_blocks_far_behind_groups() {
    let a = participant(1, 50, "0/80");
    let b = participant(2, 50, "0/75");
    let refs = [&a, &b];
    let primary: Lsn = "0/100".parse().unwrap();

    match select_candidate(&refs, |_| true, Some(primary), 16) {
        Selection::DataLossGuard {
            most_advanced,
            primary_lsn,
        } => {
            assert_eq!(most_advanced, "0/80".parse().unwrap());
            assert_eq!(primary_lsn, primary);
        }
        other => panic!("expected the guard to trip, got {other:?}"),
    }

    // A generous threshold lets the same group elect.
    match select_candidate(&refs, |_| true, Some(primary), 64) {
        Selection::Selected(node) => assert_eq!(node.node_id, 1),
        other => panic!("expected a selection, got {other:?}"),
    }
}

#[test]
fn guard_ignores_a_primary_that_is_behind() {
    let a = participant(1, 50, "0/9000");
    let refs = [&a];
    let primary: Lsn = "0/100".parse().unwrap();
    match select_candidate(&refs, |_| true, Some(primary), 16) {
        Selection::Selected(node) => assert_eq!(node.node_id, 1),
        other => panic!("expected a selection, got {other:?}"),
    }
}

#[test]
fn empty_round_yields_no_candidate() {
    assert_eq!(
        select_candidate(&[], |_| true, None, 16),
        Selection::NoCandidate
    );
}

#[test]
fn election_order_is_total() {
    let a = participant(1, 50, "0/5000");
    let b = participant(2, 50, "0/5000");
    assert_eq!(candidate_order(&a, &a), std::cmp::Ordering::Equal);
    assert_eq!(
        candidate_order(&a, &b),
        candidate_order(&b, &a).reverse()
    );
}
