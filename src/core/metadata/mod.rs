// src/core/metadata/mod.rs

//! The metadata subsystem: node and formation rows plus the store that owns
//! them under the group/formation locking discipline.

pub mod formation;
pub mod node;
pub mod store;

pub use formation::{Formation, FormationState, Group};
pub use node::{MAX_CANDIDATE_PRIORITY, Node};
pub use store::{MetadataStore, NodeLocation};
