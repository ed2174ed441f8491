//! Read-side shape of a stored result.
//!
//! A result is replayed from its raw payload when one was kept, which
//! preserves fields the placement rows do not store (dimensions, color).
//! Older results without a payload are rebuilt from placement rows.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::reconcile::{
    pick_array, pick_number, token_of, NumericFallback, ResultSummary, PLACED_ITEMS_KEYS,
    POSITION_X_KEYS, POSITION_Y_KEYS, POSITION_Z_KEYS, ROTATION_KEYS,
};
use crate::types::DbId;

/// One placed item as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedItemView {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rotation: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// A stored result as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultView {
    pub id: DbId,
    pub fill_rate: f64,
    pub total_weight: f64,
    pub placed_items: Vec<PlacedItemView>,
}

impl ResultView {
    /// Rebuild the placement list from a raw final payload.
    pub fn from_payload(
        id: DbId,
        summary: ResultSummary,
        payload: &Value,
        policy: NumericFallback,
    ) -> Self {
        let placed_items = payload
            .as_object()
            .and_then(|object| pick_array(object, &PLACED_ITEMS_KEYS))
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|item| view_of(item, policy))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id,
            fill_rate: summary.fill_rate,
            total_weight: summary.total_weight,
            placed_items,
        }
    }
}

fn view_of(item: &Map<String, Value>, policy: NumericFallback) -> PlacedItemView {
    PlacedItemView {
        id: token_of(item),
        x: pick_number(item, &POSITION_X_KEYS, policy),
        y: pick_number(item, &POSITION_Y_KEYS, policy),
        z: pick_number(item, &POSITION_Z_KEYS, policy),
        rotation: pick_number(item, &ROTATION_KEYS, policy) as i32,
        length: item.get("length").and_then(Value::as_f64),
        width: item.get("width").and_then(Value::as_f64),
        height: item.get("height").and_then(Value::as_f64),
        weight: item.get("weight").and_then(Value::as_f64),
        color: item.get("color").and_then(Value::as_str).map(str::to_string),
    }
}
