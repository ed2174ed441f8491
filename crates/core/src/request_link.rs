//! Time-window matching between calculation requests and calculations.
//!
//! Older request rows were written without a `calculation_id`. They are
//! linked after the fact by looking for a calculation on the same
//! container and algorithm created close in time. The same window is
//! used as a lookup fallback when reading results for such rows.

use chrono::Duration;

use crate::types::{DbId, Timestamp};

/// Half-width of the matching window around a request's creation time.
pub const LINK_WINDOW_MINUTES: i64 = 5;

pub fn link_window() -> Duration {
    Duration::minutes(LINK_WINDOW_MINUTES)
}

/// Inclusive `(start, end)` bounds of the window around `at`.
pub fn window_around(at: Timestamp) -> (Timestamp, Timestamp) {
    (at - link_window(), at + link_window())
}

/// A calculation that could own a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkCandidate {
    pub calculation_id: DbId,
    pub created_at: Timestamp,
}

/// Choose the calculation to link a request created at `request_created_at`.
///
/// Candidates outside the window are ignored. One remaining candidate is
/// taken as is; with several, the strictly nearest in time is taken.
/// An exact tie for nearest is ambiguous and yields `None`.
pub fn pick_link(request_created_at: Timestamp, candidates: &[LinkCandidate]) -> Option<DbId> {
    let (start, end) = window_around(request_created_at);
    let mut best: Option<(Duration, DbId)> = None;
    let mut tie = false;

    for candidate in candidates
        .iter()
        .filter(|c| c.created_at >= start && c.created_at <= end)
    {
        let delta = candidate.created_at - request_created_at;
        let distance = if delta < Duration::zero() { -delta } else { delta };
        match best {
            Some((best_distance, _)) if distance > best_distance => {}
            Some((best_distance, _)) if distance == best_distance => tie = true,
            _ => {
                best = Some((distance, candidate.calculation_id));
                tie = false;
            }
        }
    }

    match best {
        Some((_, id)) if !tie => Some(id),
        _ => None,
    }
}
