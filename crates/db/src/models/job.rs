//! Persisted job correlation entries.

use loadplan_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `calculation_jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct CalculationJob {
    pub job_id: String,
    pub calculation_id: DbId,
    pub registered_at: Timestamp,
}
