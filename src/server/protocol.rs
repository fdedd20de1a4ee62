// src/server/protocol.rs

//! The wire protocol of the monitor: newline-delimited JSON. One request
//! object per line, one response object per line. The `listen` request
//! switches a connection into notification streaming.

use crate::core::MonitorError;
use crate::core::state::ReplicationState;
use crate::core::types::{DEFAULT_CLUSTER_TAG, FormationKind, Lsn, NodeHealth, NodeKind, SyncState};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Every procedure a keeper or operator can invoke, tagged by `op`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    RegisterNode {
        formation: String,
        host: String,
        port: u16,
        dbname: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        sys_identifier: u64,
        #[serde(default = "default_auto_id")]
        node_id: i64,
        #[serde(default = "default_auto_group")]
        group_id: i32,
        #[serde(default)]
        initial_state: ReplicationState,
        #[serde(default)]
        node_kind: NodeKind,
        #[serde(default = "default_candidate_priority")]
        candidate_priority: i32,
        #[serde(default = "default_replication_quorum")]
        replication_quorum: bool,
        #[serde(default = "default_cluster_tag")]
        cluster_tag: String,
    },
    NodeActive {
        formation: String,
        node_id: i64,
        group_id: i32,
        reported_state: ReplicationState,
        #[serde(default)]
        pg_is_running: bool,
        #[serde(default)]
        tli: u32,
        #[serde(default)]
        lsn: Lsn,
        #[serde(default)]
        sync_state: SyncState,
    },
    GetPrimary {
        formation: String,
        #[serde(default)]
        group_id: i32,
    },
    GetNodes {
        formation: String,
        #[serde(default)]
        group_id: Option<i32>,
    },
    GetOtherNodes {
        node_id: i64,
        #[serde(default)]
        current_state: Option<ReplicationState>,
    },
    RemoveNodeByNodeid {
        node_id: i64,
        #[serde(default)]
        force: bool,
    },
    RemoveNodeByHost {
        host: String,
        port: u16,
        #[serde(default)]
        force: bool,
    },
    PerformFailover {
        formation: String,
        #[serde(default)]
        group_id: i32,
    },
    PerformPromotion {
        formation: String,
        name: String,
    },
    StartMaintenance {
        node_id: i64,
    },
    StopMaintenance {
        node_id: i64,
    },
    SetNodeCandidatePriority {
        formation: String,
        name: String,
        candidate_priority: i32,
    },
    SetNodeReplicationQuorum {
        formation: String,
        name: String,
        replication_quorum: bool,
    },
    SetFormationNumberSyncStandbys {
        formation: String,
        number_sync_standbys: i32,
    },
    UpdateNodeMetadata {
        node_id: i64,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        host: Option<String>,
        #[serde(default)]
        port: Option<u16>,
    },
    SynchronousStandbyNames {
        formation: String,
        #[serde(default)]
        group_id: i32,
    },
    CurrentState {
        formation: String,
        #[serde(default)]
        group_id: Option<i32>,
    },
    LastEvents {
        #[serde(default)]
        formation: Option<String>,
        #[serde(default)]
        group_id: Option<i32>,
        #[serde(default = "default_event_count")]
        count: usize,
    },
    CreateFormation {
        formation: String,
        kind: FormationKind,
        dbname: String,
        #[serde(default = "default_opt_secondary")]
        opt_secondary: bool,
        #[serde(default)]
        number_sync_standbys: i32,
    },
    DropFormation {
        formation: String,
    },
    ReportNodeHealth {
        host: String,
        port: u16,
        health: NodeHealth,
    },
    Metrics,
    Listen {
        channel: String,
    },
}

fn default_auto_id() -> i64 {
    -1
}

fn default_auto_group() -> i32 {
    -1
}

fn default_candidate_priority() -> i32 {
    50
}

fn default_replication_quorum() -> bool {
    true
}

fn default_cluster_tag() -> String {
    DEFAULT_CLUSTER_TAG.to_string()
}

fn default_event_count() -> usize {
    10
}

fn default_opt_secondary() -> bool {
    true
}

/// The error object callers receive; `class` is stable, `detail` is for
/// humans, `hint` is present when the monitor has advice.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub class: &'static str,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'static str>,
}

impl From<&MonitorError> for ErrorBody {
    fn from(error: &MonitorError) -> Self {
        Self {
            class: error.class(),
            detail: error.to_string(),
            hint: error.hint(),
        }
    }
}

/// Renders one successful response line.
pub fn ok_line(value: impl Serialize) -> String {
    json!({ "result": value }).to_string()
}

/// Renders one error response line.
pub fn error_line(error: &MonitorError) -> String {
    json!({ "error": ErrorBody::from(error) }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_node_active_line() {
        let line = r#"{"op":"node_active","formation":"default","node_id":1,"group_id":0,
            "reported_state":"primary","pg_is_running":true,"tli":1,"lsn":"0/4000060",
            "sync_state":"quorum"}"#;
        let request: Request = serde_json::from_str(line).unwrap();
        match request {
            Request::NodeActive {
                reported_state,
                lsn,
                ..
            } => {
                assert_eq!(reported_state, ReplicationState::Primary);
                assert_eq!(lsn, "0/4000060".parse().unwrap());
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn register_defaults_apply() {
        let line = r#"{"op":"register_node","formation":"default","host":"db1","port":5432,
            "dbname":"app"}"#;
        let request: Request = serde_json::from_str(line).unwrap();
        match request {
            Request::RegisterNode {
                node_id,
                group_id,
                candidate_priority,
                replication_quorum,
                cluster_tag,
                ..
            } => {
                assert_eq!(node_id, -1);
                assert_eq!(group_id, -1);
                assert_eq!(candidate_priority, 50);
                assert!(replication_quorum);
                assert_eq!(cluster_tag, DEFAULT_CLUSTER_TAG);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn unknown_op_is_rejected() {
        let line = r#"{"op":"frobnicate"}"#;
        assert!(serde_json::from_str::<Request>(line).is_err());
    }
}
