// src/core/fsm/selector.rs

//! The candidate selector: a pure function over the nodes that published
//! their WAL position during a failover. Separated from the FSM rules so the
//! election order and the data-loss guard can be tested in isolation.

use crate::core::metadata::Node;
use crate::core::types::Lsn;
use std::cmp::Ordering;

/// The outcome of one election round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection<'a> {
    /// This node wins: highest candidate priority among healthy reporters,
    /// ties broken by the most advanced WAL position, then by smallest id.
    Selected(&'a Node),
    /// No healthy participant is allowed to be promoted; retry next tick.
    NoCandidate,
    /// Promoting now would lose acknowledged writes: even the most advanced
    /// participant is too far behind the primary's last known position.
    DataLossGuard {
        most_advanced: Lsn,
        primary_lsn: Lsn,
    },
}

/// The total election order: candidate priority descending, reported LSN
/// descending, node id ascending. Sorting once with this order makes the
/// winner the first element.
pub fn candidate_order(a: &Node, b: &Node) -> Ordering {
    b.candidate_priority
        .cmp(&a.candidate_priority)
        .then_with(|| b.reported_lsn.cmp(&a.reported_lsn))
        .then_with(|| a.node_id.cmp(&b.node_id))
}

/// Elects a promotion target among `participants`, the nodes that have
/// reached `report_lsn`. Zero-priority participants still contribute their
/// WAL position (both to the guard and as fast-forward sources) but are
/// never elected themselves.
pub fn select_candidate<'a>(
    participants: &[&'a Node],
    is_healthy: impl Fn(&Node) -> bool,
    primary_lsn: Option<Lsn>,
    promote_wal_threshold: u64,
) -> Selection<'a> {
    if participants.is_empty() {
        return Selection::NoCandidate;
    }

    let most_advanced = participants
        .iter()
        .map(|n| n.reported_lsn)
        .max()
        .unwrap_or_default();

    if let Some(primary_lsn) = primary_lsn
        && primary_lsn > most_advanced
        && primary_lsn.distance(most_advanced) > promote_wal_threshold
    {
        return Selection::DataLossGuard {
            most_advanced,
            primary_lsn,
        };
    }

    let mut candidates: Vec<&&Node> = participants
        .iter()
        .filter(|n| n.is_failover_candidate() && is_healthy(n))
        .collect();
    if candidates.is_empty() {
        return Selection::NoCandidate;
    }

    candidates.sort_by(|a, b| candidate_order(a, b));
    Selection::Selected(candidates[0])
}
