//! Calculation rows and the input snapshot stored alongside them.

use loadplan_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A row from the `calculations` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Calculation {
    pub id: DbId,
    pub user_id: DbId,
    pub container_id: Option<DbId>,
    pub constraints_id: Option<DbId>,
    pub algorithm: String,
    pub activity_name: Option<String>,
    pub created_at: Timestamp,
}

/// One entry of a user's calculation history list.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CalculationSummary {
    pub id: DbId,
    pub algorithm: String,
    pub activity_name: Option<String>,
    pub container_id: Option<DbId>,
    pub created_at: Timestamp,
    pub fill_rate: Option<f64>,
    pub total_weight: Option<f64>,
}

// ---------------------------------------------------------------------------
// Input snapshot
// ---------------------------------------------------------------------------

/// A row from the `containers` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ContainerRow {
    pub id: DbId,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub max_weight: f64,
}

/// A row from the `constraints` table.
#[derive(Debug, Clone, Copy, Serialize, FromRow)]
pub struct ConstraintsRow {
    pub id: DbId,
    pub enforce_load_capacity: bool,
    pub enforce_stacking: bool,
    pub enforce_priority: bool,
    pub enforce_lifo: bool,
}

/// A group snapshot row from the `groups` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct GroupSnapshot {
    pub id: DbId,
    pub group_id_string: String,
    pub name: String,
    pub color: String,
}

/// An item on a calculation's container, joined with its item group.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ItemRow {
    pub id: DbId,
    pub external_id: Option<String>,
    pub name: String,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub weight: f64,
    pub quantity: i32,
    pub group_id: Option<DbId>,
    pub group_name: Option<String>,
    pub group_color: Option<String>,
}

/// Everything stored about a calculation's input.
#[derive(Debug, Clone, Serialize)]
pub struct CalculationDetail {
    pub calculation: Calculation,
    pub container: Option<ContainerRow>,
    pub constraints: Option<ConstraintsRow>,
    pub groups: Vec<GroupSnapshot>,
    pub items: Vec<ItemRow>,
}
