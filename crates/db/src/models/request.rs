//! Calculation request rows.

use loadplan_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `calculation_requests` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CalculationRequest {
    pub id: DbId,
    pub user_id: Option<DbId>,
    pub container_id: Option<DbId>,
    pub calculation_id: Option<DbId>,
    pub algorithm: String,
    pub enforce_load_capacity: bool,
    pub enforce_stacking: bool,
    pub enforce_priority: bool,
    pub enforce_lifo: bool,
    pub created_at: Timestamp,
}

/// Outcome of a link backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Unlinked requests examined.
    pub scanned: u64,
    /// Requests that received a `calculation_id`.
    pub linked: u64,
    /// Requests left unlinked: no candidate or an ambiguous tie.
    pub skipped: u64,
}
