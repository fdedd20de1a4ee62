// tests/unit_events_test.rs

//! Tests for the event log and the `"state"` notification channel:
//! commit-order delivery, the JSON payload shape, the query windows, and
//! heartbeat idempotence.

#[path = "integration/test_helpers.rs"]
mod test_helpers;

use steward::core::ReplicationState;
use test_helpers::{FORMATION, TestCluster};

#[test]
fn notifications_arrive_in_commit_order() {
    let cluster = TestCluster::new();
    let mut receiver = cluster.monitor.events().subscribe();

    cluster.converged_pair();

    let mut seen = Vec::new();
    while let Ok(notification) = receiver.try_recv() {
        seen.push(notification);
    }
    assert!(!seen.is_empty());

    // The same transitions, in the same order, are in the event log.
    let events = cluster.monitor.last_events(Some(FORMATION), None, 100);
    assert_eq!(seen.len(), events.len());
    for (notification, event) in seen.iter().zip(&events) {
        assert_eq!(notification.description, event.description);
        assert_eq!(notification.node_id, event.node_id);
    }
    // Event ids are dense and ascending.
    for pair in events.windows(2) {
        assert_eq!(pair[1].event_id, pair[0].event_id + 1);
    }
}

#[test]
fn notification_payload_uses_the_documented_field_names() {
    let cluster = TestCluster::new();
    let mut receiver = cluster.monitor.events().subscribe();
    cluster.register("a", 50, true);

    let notification = receiver.try_recv().expect("registration notifies");
    let payload = serde_json::to_value(&notification).unwrap();
    let object = payload.as_object().unwrap();
    for key in [
        "type",
        "formation",
        "nodeId",
        "groupId",
        "name",
        "host",
        "port",
        "reportedState",
        "goalState",
        "health",
        "description",
    ] {
        assert!(object.contains_key(key), "missing key {key} in {object:?}");
    }
    assert_eq!(object["type"], "state");
    assert_eq!(object["formation"], FORMATION);
    assert_eq!(object["goalState"], "single");
}

#[test]
fn last_events_windows_are_chronological_and_filtered() {
    let cluster = TestCluster::new();
    cluster.converged_pair();

    let all = cluster.monitor.last_events(None, None, 1000);
    let two = cluster.monitor.last_events(None, None, 2);
    assert_eq!(two.len(), 2);
    assert_eq!(two[0].event_id, all[all.len() - 2].event_id);
    assert_eq!(two[1].event_id, all[all.len() - 1].event_id);

    assert!(
        cluster
            .monitor
            .last_events(Some("nonexistent"), None, 10)
            .is_empty()
    );
    assert_eq!(
        cluster
            .monitor
            .last_events(Some(FORMATION), Some(0), 1000)
            .len(),
        all.len()
    );
}

#[test]
fn identical_heartbeats_do_not_accumulate_events() {
    let cluster = TestCluster::new();
    let (a, b) = cluster.converged_pair();

    let before = cluster.monitor.last_events(None, None, 1000).len();
    let first = cluster.report(a.node_id, ReplicationState::Primary, "0/1000000");
    let second = cluster.report(a.node_id, ReplicationState::Primary, "0/1000000");
    assert_eq!(first, second);
    let after = cluster.monitor.last_events(None, None, 1000).len();
    assert_eq!(before, after);

    // The standby's steady heartbeat is just as quiet.
    let before = after;
    cluster.report(b.node_id, ReplicationState::Secondary, "0/1000000");
    let after = cluster.monitor.last_events(None, None, 1000).len();
    assert_eq!(before, after);
}
