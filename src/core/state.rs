// src/core/state.rs

//! The replication state machine vocabulary shared by the monitor and the
//! keeper agents. A node always carries two of these: the state its keeper
//! last reported having achieved, and the goal state the monitor last
//! assigned. The FSM in `core::fsm` is the only place that assigns goals.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Every state a node can report or be assigned. States are serialized as
/// stable snake_case tags at the wire boundary and kept canonical internally.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReplicationState {
    /// Not yet reported anything.
    #[default]
    Unknown,
    /// Freshly registered, initializing its data directory.
    Init,
    /// The only node of its group, accepting writes without replication.
    Single,
    /// Accepting writes, replication slots open, but no sync standby yet.
    WaitPrimary,
    /// Accepting writes with synchronous replication active.
    Primary,
    /// Accepting writes while opening replication for a joining standby.
    JoinPrimary,
    /// Reloading replication settings, then back to primary.
    ApplySettings,
    /// Blocking new writes so standbys can catch up before demotion.
    Draining,
    /// Demotion ordered, waiting for the keeper to confirm Postgres stopped.
    DemoteTimeout,
    /// No longer accepting writes; a standby took over.
    Demoted,
    /// Primary stepping down into maintenance.
    PrepareMaintenance,
    /// Disabled by the operator; ignored by the FSM.
    Maintenance,
    /// Standby waiting for the primary to stop counting it before maintenance.
    WaitMaintenance,
    /// Streaming from the primary but lagging or freshly (re)attached.
    CatchingUp,
    /// Streaming from the primary and eligible for synchronous replication.
    Secondary,
    /// Failover under way: publish the last received WAL position.
    ReportLsn,
    /// Selected for promotion, getting ready to accept writes.
    PreparePromotion,
    /// Fetching missing WAL from a more advanced standby before promotion.
    FastForward,
    /// Stopping replication, about to be promoted.
    StopReplication,
    /// Waiting for the primary to open replication before base backup.
    WaitStandby,
    /// Re-attaching to a newly promoted primary after a failover.
    JoinSecondary,
    /// Terminal: the keeper acknowledges, then the row is deleted.
    Dropped,
}

impl ReplicationState {
    /// States in which a node takes writes. At most one node per group may
    /// have its reported or goal state in this set.
    pub fn is_writable(self) -> bool {
        use ReplicationState::*;
        matches!(self, Single | WaitPrimary | Primary | JoinPrimary)
    }

    /// States in which a node holds the group's primary seat, including the
    /// transitional states where it is reconfiguring or being demoted.
    /// `Demoted` is excluded: the seat has been released.
    pub fn holds_primary_seat(self) -> bool {
        use ReplicationState::*;
        self.is_writable()
            || matches!(
                self,
                ApplySettings | Draining | DemoteTimeout | PrepareMaintenance
            )
    }

    /// States of a standby that follows (or is joining) the primary.
    pub fn is_standby(self) -> bool {
        use ReplicationState::*;
        matches!(
            self,
            WaitStandby
                | CatchingUp
                | Secondary
                | ReportLsn
                | PreparePromotion
                | FastForward
                | StopReplication
                | JoinSecondary
        )
    }

    /// Maintenance states, including the primary's preparation step.
    pub fn is_in_maintenance(self) -> bool {
        use ReplicationState::*;
        matches!(self, PrepareMaintenance | WaitMaintenance | Maintenance)
    }

    /// A standby that has been picked and is on its way to `wait_primary`.
    pub fn is_being_promoted(self) -> bool {
        use ReplicationState::*;
        matches!(self, PreparePromotion | FastForward | StopReplication)
    }

    /// States that may participate in an election once asked to report
    /// their WAL position.
    pub fn is_failover_candidate_state(self) -> bool {
        use ReplicationState::*;
        matches!(self, Secondary | CatchingUp)
    }
}
