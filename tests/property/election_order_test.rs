// tests/property/election_order_test.rs

//! Property-based tests for the candidate selector: the election order is
//! a strict total order, the winner is maximal, and the data-loss guard
//! never lets a too-far-behind group promote.

use proptest::prelude::*;
use std::cmp::Ordering;
use std::time::Instant;
use steward::core::fsm::selector::{Selection, candidate_order, select_candidate};
use steward::core::metadata::Node;
use steward::core::state::ReplicationState;
use steward::core::types::{Lsn, NodeKind};

fn participant(node_id: i64, priority: i32, lsn: u64) -> Node {
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
    node.reported_lsn = Lsn(lsn);
    node
}

prop_compose! {
    fn arb_participant(max_id: i64)
        (node_id in 1..=max_id, priority in 0..=100i32, lsn in 0u64..1_000_000)
        -> (i64, i32, u64)
    {
        (node_id, priority, lsn)
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    })]

    #[test]
    fn election_order_is_antisymmetric_and_transitive(
        specs in prop::collection::vec(arb_participant(1000), 3)
    ) {
        let a = participant(specs[0].0, specs[0].1, specs[0].2);
        let b = participant(specs[1].0, specs[1].1, specs[1].2);
        let c = participant(specs[2].0, specs[2].1, specs[2].2);

        prop_assert_eq!(candidate_order(&a, &b), candidate_order(&b, &a).reverse());
        if candidate_order(&a, &b) != Ordering::Greater
            && candidate_order(&b, &c) != Ordering::Greater
        {
            prop_assert_ne!(candidate_order(&a, &c), Ordering::Greater);
        }
    }

    #[test]
    fn winner_has_the_highest_priority_among_healthy_reporters(
        specs in prop::collection::vec(arb_participant(1000), 1..8)
    ) {
        let nodes: Vec<Node> = specs
            .iter()
            .enumerate()
            .map(|(i, (_, priority, lsn))| participant(i as i64 + 1, *priority, *lsn))
            .collect();
        let refs: Vec<&Node> = nodes.iter().collect();

        match select_candidate(&refs, |_| true, None, u64::MAX) {
            Selection::Selected(winner) => {
                prop_assert!(winner.candidate_priority > 0);
                for node in &nodes {
                    if node.candidate_priority > 0 {
                        prop_assert!(winner.candidate_priority >= node.candidate_priority);
                        if winner.candidate_priority == node.candidate_priority {
                            prop_assert!(winner.reported_lsn >= node.reported_lsn
                                || winner.node_id < node.node_id);
                        }
                    }
                }
            }
            Selection::NoCandidate => {
                prop_assert!(nodes.iter().all(|n| n.candidate_priority == 0));
            }
            Selection::DataLossGuard { .. } => {
                prop_assert!(false, "no guard without a primary position");
            }
        }
    }

    #[test]
    fn guard_trips_exactly_when_the_group_is_too_far_behind(
        specs in prop::collection::vec(arb_participant(1000), 1..8),
        primary_lsn in 0u64..2_000_000,
        threshold in 0u64..1_000_000,
    ) {
        let nodes: Vec<Node> = specs
            .iter()
            .enumerate()
            .map(|(i, (_, priority, lsn))| participant(i as i64 + 1, *priority, *lsn))
            .collect();
        let refs: Vec<&Node> = nodes.iter().collect();
        let most_advanced = nodes.iter().map(|n| n.reported_lsn.0).max().unwrap();

        let result = select_candidate(&refs, |_| true, Some(Lsn(primary_lsn)), threshold);
        let too_far = primary_lsn > most_advanced && primary_lsn - most_advanced > threshold;
        match result {
            Selection::DataLossGuard { .. } => prop_assert!(too_far),
            _ => prop_assert!(!too_far),
        }
    }
}
