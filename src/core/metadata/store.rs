// src/core/metadata/store.rs

//! The authoritative, in-memory metadata store. All node and formation rows
//! live here; every mutation happens under the containing group's exclusive
//! lock, and formation-level changes under the formation's exclusive lock.

use crate::core::errors::MonitorError;
use crate::core::metadata::formation::{Formation, FormationState, Group};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Where a node row lives: handles to its formation and group, so callers
/// can take the locks in the canonical order (formation, then group).
#[derive(Clone)]
pub struct NodeLocation {
    pub formation: Arc<FormationState>,
    pub group: Arc<Mutex<Group>>,
    pub node_id: i64,
}

#[derive(Debug, Default)]
pub struct MetadataStore {
    formations: DashMap<String, Arc<FormationState>>,
    node_id_seq: AtomicI64,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the next node id. Ids are assigned once and never reused.
    pub fn next_node_id(&self) -> i64 {
        self.node_id_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Records an explicitly requested node id so the sequence never hands
    /// it out again.
    pub fn claim_node_id(&self, node_id: i64) {
        self.node_id_seq.fetch_max(node_id, Ordering::SeqCst);
    }

    pub fn formation(&self, formation_id: &str) -> Option<Arc<FormationState>> {
        self.formations.get(formation_id).map(|f| f.clone())
    }

    pub fn expect_formation(&self, formation_id: &str) -> Result<Arc<FormationState>, MonitorError> {
        self.formation(formation_id).ok_or_else(|| {
            MonitorError::UndefinedObject(format!("formation \"{formation_id}\""))
        })
    }

    /// Inserts a formation row; fails if the name is taken.
    pub fn insert_formation(&self, formation: Formation) -> Result<Arc<FormationState>, MonitorError> {
        let formation_id = formation.formation_id.clone();
        let state = Arc::new(FormationState::new(formation));
        match self.formations.entry(formation_id.clone()) {
            Entry::Occupied(_) => Err(MonitorError::InvalidObjectDefinition(format!(
                "formation \"{formation_id}\" already exists"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(state.clone());
                Ok(state)
            }
        }
    }

    /// Fetches the formation, creating it with the given row on first use.
    pub fn formation_or_insert(&self, formation: Formation) -> Arc<FormationState> {
        self.formations
            .entry(formation.formation_id.clone())
            .or_insert_with(|| Arc::new(FormationState::new(formation)))
            .clone()
    }

    pub fn remove_formation(&self, formation_id: &str) -> bool {
        self.formations.remove(formation_id).is_some()
    }

    pub fn formation_ids(&self) -> Vec<String> {
        self.formations.iter().map(|e| e.key().clone()).collect()
    }

    /// Finds a node row by id across all formations.
    pub fn locate_node(&self, node_id: i64) -> Option<NodeLocation> {
        for formation in self.formations.iter() {
            for group in formation.value().groups.iter() {
                if group.value().lock().nodes.contains_key(&node_id) {
                    return Some(NodeLocation {
                        formation: formation.value().clone(),
                        group: group.value().clone(),
                        node_id,
                    });
                }
            }
        }
        None
    }

    /// Finds a node row by `host:port`, which is unique across all nodes.
    pub fn locate_node_by_addr(&self, host: &str, port: u16) -> Option<NodeLocation> {
        for formation in self.formations.iter() {
            for group in formation.value().groups.iter() {
                let found = group
                    .value()
                    .lock()
                    .nodes
                    .values()
                    .find(|n| n.node_host == host && n.node_port == port)
                    .map(|n| n.node_id);
                if let Some(node_id) = found {
                    return Some(NodeLocation {
                        formation: formation.value().clone(),
                        group: group.value().clone(),
                        node_id,
                    });
                }
            }
        }
        None
    }

    /// Finds a node row by name within one formation.
    pub fn locate_node_by_name(&self, formation_id: &str, name: &str) -> Option<NodeLocation> {
        let formation = self.formation(formation_id)?;
        for group in formation.groups.iter() {
            let found = group
                .value()
                .lock()
                .nodes
                .values()
                .find(|n| n.node_name == name)
                .map(|n| n.node_id);
            if let Some(node_id) = found {
                return Some(NodeLocation {
                    formation: formation.clone(),
                    group: group.value().clone(),
                    node_id,
                });
            }
        }
        None
    }

    /// Total registered nodes, for the metrics gauge.
    pub fn total_node_count(&self) -> usize {
        self.formations
            .iter()
            .map(|f| f.value().node_count())
            .sum()
    }
}
