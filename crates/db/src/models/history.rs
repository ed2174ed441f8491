//! History rows: the deletion anchor for a calculation's derived data.

use loadplan_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `history_rows` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct HistoryRow {
    pub id: DbId,
    pub calculation_id: DbId,
    pub request_id: Option<DbId>,
    pub result_id: Option<DbId>,
    pub user_id: Option<DbId>,
    pub algorithm: Option<String>,
    pub activity_name: Option<String>,
    pub container_id: Option<DbId>,
    pub constraints_id: Option<DbId>,
    pub created_at: Timestamp,
}

/// Row counts removed by one history cascade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub history_rows: u64,
    pub placed_items: u64,
    pub loaded_boxes: u64,
    pub results: u64,
    pub requests: u64,
    pub groups: u64,
    pub calculations: u64,
    pub items: u64,
    pub containers: u64,
    pub constraints: u64,
    pub jobs: u64,
}
