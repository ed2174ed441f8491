//! Stored results and their placement rows.

use loadplan_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `calculation_results` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CalculationResult {
    pub id: DbId,
    pub request_id: DbId,
    pub fill_rate: f64,
    pub total_weight: f64,
    pub raw_payload: Option<serde_json::Value>,
    pub created_at: Timestamp,
}

/// A placed item joined with its item and group, for result replay.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PlacedItemRow {
    pub id: DbId,
    pub item_id: DbId,
    pub item_name: String,
    pub position_x: f64,
    pub position_y: f64,
    pub position_z: f64,
    pub rotation_type: i32,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub weight: f64,
    pub color: Option<String>,
}

/// Ids written by one successful persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistedResult {
    pub calculation_id: DbId,
    pub request_id: DbId,
    pub result_id: DbId,
    pub history_id: DbId,
    pub placed_count: usize,
    /// Placement tokens that matched no item and were dropped.
    pub unresolved: Vec<String>,
}
