// src/core/events.rs

//! The append-only event log and the `"state"` notification channel.
//!
//! Every goal-state assignment appends one event record and publishes one
//! JSON notification. Both happen while the group's exclusive lock is held,
//! so listeners observe notifications in commit order.

use crate::core::health::Liveness;
use crate::core::metadata::Node;
use crate::core::metrics;
use crate::core::state::ReplicationState;
use crate::core::types::{Lsn, SyncState};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

/// The channel external observers subscribe to.
pub const STATE_CHANNEL: &str = "state";

/// How many events the in-memory log retains before the oldest are pruned.
const EVENT_LOG_CAPACITY: usize = 16384;

/// The capacity of the notification broadcast channel. Slow listeners that
/// lag past this many messages miss the overflow and must re-query
/// `current_state`.
const STATE_CHANNEL_CAPACITY: usize = 4096;

/// One state-transition record, append-only.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event_id: i64,
    pub event_time: DateTime<Utc>,
    pub formation_id: String,
    pub group_id: i32,
    pub node_id: i64,
    pub node_name: String,
    pub node_host: String,
    pub node_port: u16,
    pub reported_state: ReplicationState,
    pub goal_state: ReplicationState,
    pub reported_sync_state: SyncState,
    pub reported_lsn: Lsn,
    pub candidate_priority: i32,
    pub replication_quorum: bool,
    pub description: String,
}

/// The compact JSON payload published on the `"state"` channel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateNotification {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub formation: String,
    pub node_id: i64,
    pub group_id: i32,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub reported_state: ReplicationState,
    pub goal_state: ReplicationState,
    pub health: Liveness,
    pub description: String,
}

/// The event log plus its pub/sub side. One instance per monitor.
#[derive(Debug)]
pub struct EventLog {
    events: Mutex<VecDeque<Event>>,
    seq: AtomicI64,
    notify_tx: broadcast::Sender<StateNotification>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        let (notify_tx, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            events: Mutex::new(VecDeque::new()),
            seq: AtomicI64::new(0),
            notify_tx,
        }
    }

    /// Appends one event built from the node's current row, then publishes
    /// the matching notification. Returns the assigned event id.
    pub fn append(&self, node: &Node, health: Liveness, description: &str) -> i64 {
        let event_id = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let event = Event {
            event_id,
            event_time: Utc::now(),
            formation_id: node.formation_id.clone(),
            group_id: node.group_id,
            node_id: node.node_id,
            node_name: node.node_name.clone(),
            node_host: node.node_host.clone(),
            node_port: node.node_port,
            reported_state: node.reported_state,
            goal_state: node.goal_state,
            reported_sync_state: node.sync_state,
            reported_lsn: node.reported_lsn,
            candidate_priority: node.candidate_priority,
            replication_quorum: node.replication_quorum,
            description: description.to_string(),
        };

        {
            let mut events = self.events.lock();
            if events.len() == EVENT_LOG_CAPACITY {
                events.pop_front();
            }
            events.push_back(event);
        }
        metrics::EVENTS_APPENDED_TOTAL.inc();

        let notification = StateNotification {
            kind: STATE_CHANNEL,
            formation: node.formation_id.clone(),
            node_id: node.node_id,
            group_id: node.group_id,
            name: node.node_name.clone(),
            host: node.node_host.clone(),
            port: node.node_port,
            reported_state: node.reported_state,
            goal_state: node.goal_state,
            health,
            description: description.to_string(),
        };
        // It's okay if there are no active listeners.
        if self.notify_tx.send(notification).is_err() {
            debug!("Published a state notification with no active listeners.");
        }

        event_id
    }

    /// Provides a new receiver for a listener subscribing to the channel.
    pub fn subscribe(&self) -> broadcast::Receiver<StateNotification> {
        self.notify_tx.subscribe()
    }

    /// The newest `count` events matching the filters, returned in
    /// chronological order.
    pub fn last_events(
        &self,
        formation: Option<&str>,
        group_id: Option<i32>,
        count: usize,
    ) -> Vec<Event> {
        let events = self.events.lock();
        let mut selected: Vec<Event> = events
            .iter()
            .rev()
            .filter(|e| formation.is_none_or(|f| e.formation_id == f))
            .filter(|e| group_id.is_none_or(|g| e.group_id == g))
            .take(count)
            .cloned()
            .collect();
        selected.reverse();
        selected
    }
}
