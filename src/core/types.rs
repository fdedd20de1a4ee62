// src/core/types.rs

//! Shared value types used across the monitor: WAL positions, node health,
//! formation and node kinds, and the sync state reported by the streaming
//! replication protocol.

use crate::core::errors::MonitorError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use strum_macros::{Display, EnumString};

/// The cluster tag carried by regular HA nodes. Any other tag marks a
/// read-replica, which must keep `candidate_priority = 0`.
pub const DEFAULT_CLUSTER_TAG: &str = "default";

/// A PostgreSQL log sequence number: a 64-bit byte position in the WAL.
///
/// Rendered in the `X/X` hexadecimal text form used by PostgreSQL
/// (`16/B3748A90`), and compared numerically everywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Lsn(pub u64);

impl Lsn {
    /// The invalid position, reported by nodes that have not streamed yet.
    pub const INVALID: Lsn = Lsn(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Absolute distance in bytes between two WAL positions.
    pub fn distance(self, other: Lsn) -> u64 {
        self.0.abs_diff(other.0)
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 & 0xFFFF_FFFF)
    }
}

impl FromStr for Lsn {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hi, lo) = s
            .split_once('/')
            .ok_or_else(|| MonitorError::InvalidLsn(s.to_string()))?;
        let hi = u64::from_str_radix(hi, 16)
            .map_err(|_| MonitorError::InvalidLsn(s.to_string()))?;
        let lo = u64::from_str_radix(lo, 16)
            .map_err(|_| MonitorError::InvalidLsn(s.to_string()))?;
        if hi > u64::from(u32::MAX) || lo > u64::from(u32::MAX) {
            return Err(MonitorError::InvalidLsn(s.to_string()));
        }
        Ok(Lsn((hi << 32) | lo))
    }
}

// LSNs cross the wire in their PostgreSQL text form, not as raw integers.
impl Serialize for Lsn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Lsn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The last verdict recorded by the external health prober for a node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NodeHealth {
    /// No probe result recorded yet.
    #[default]
    Unknown,
    /// The last probe failed to reach the node's database.
    Bad,
    /// The last probe succeeded.
    Good,
}

/// The `sync_state` a standby holds in the primary's replication view,
/// as relayed by the keeper on each `node_active` call.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SyncState {
    #[default]
    Unknown,
    Async,
    Potential,
    Sync,
    Quorum,
}

impl SyncState {
    /// Lenient parse: keepers on older versions report an empty string.
    pub fn parse_lossy(s: &str) -> SyncState {
        s.parse().unwrap_or(SyncState::Unknown)
    }
}

/// The kind of a formation, fixed once its first node registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FormationKind {
    /// A single replication group (group 0).
    Pgsql,
    /// A Citus formation: group 0 is the coordinator, groups >= 1 are workers.
    Citus,
}

/// What role a registering node intends to play.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NodeKind {
    #[default]
    Standalone,
    Coordinator,
    Worker,
}

impl NodeKind {
    /// The formation kind implied when this node creates its formation.
    pub fn implied_formation_kind(self) -> FormationKind {
        match self {
            NodeKind::Standalone => FormationKind::Pgsql,
            NodeKind::Coordinator | NodeKind::Worker => FormationKind::Citus,
        }
    }

    /// Whether a node of this kind may join a formation of the given kind.
    pub fn matches_formation(self, kind: FormationKind) -> bool {
        self.implied_formation_kind() == kind
    }
}
