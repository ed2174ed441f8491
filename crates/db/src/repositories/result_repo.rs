//! Repository for `calculation_results` and their placement rows.

use loadplan_core::reconcile::{ResolvedPlacement, ResultSummary};
use loadplan_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::result::{CalculationResult, PlacedItemRow};

/// Column list for calculation_results queries.
const COLUMNS: &str = "id, request_id, fill_rate, total_weight, raw_payload, created_at";

pub struct ResultRepo;

impl ResultRepo {
    /// Insert a result row for `request_id`, keeping the raw final payload.
    pub async fn create(
        conn: &mut PgConnection,
        request_id: DbId,
        summary: ResultSummary,
        raw_payload: &serde_json::Value,
    ) -> Result<CalculationResult, sqlx::Error> {
        let query = format!(
            "INSERT INTO calculation_results (request_id, fill_rate, total_weight, raw_payload)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CalculationResult>(&query)
            .bind(request_id)
            .bind(summary.fill_rate)
            .bind(summary.total_weight)
            .bind(raw_payload)
            .fetch_one(&mut *conn)
            .await
    }

    /// Insert the loaded-box row and then the placed-item row referencing
    /// it for one resolved placement. Returns the placed item id.
    pub async fn add_placement(
        conn: &mut PgConnection,
        result_id: DbId,
        placement: &ResolvedPlacement,
    ) -> Result<DbId, sqlx::Error> {
        let (loaded_box_id,): (DbId,) = sqlx::query_as(
            "INSERT INTO loaded_boxes (result_id, item_id, item_name)
             VALUES ($1, $2, $3)
             RETURNING id",
        )
        .bind(result_id)
        .bind(placement.item_id)
        .bind(&placement.entry.token)
        .fetch_one(&mut *conn)
        .await?;

        let entry = &placement.entry;
        let (placed_id,): (DbId,) = sqlx::query_as(
            "INSERT INTO placed_items
                (result_id, item_id, loaded_box_id, position_x, position_y, position_z,
                 rotation_type)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id",
        )
        .bind(result_id)
        .bind(placement.item_id)
        .bind(loaded_box_id)
        .bind(entry.position_x)
        .bind(entry.position_y)
        .bind(entry.position_z)
        .bind(entry.rotation)
        .fetch_one(&mut *conn)
        .await?;

        Ok(placed_id)
    }

    /// The result stored for a request.
    pub async fn find_by_request(
        pool: &PgPool,
        request_id: DbId,
    ) -> Result<Option<CalculationResult>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM calculation_results WHERE request_id = $1 ORDER BY id DESC LIMIT 1"
        );
        sqlx::query_as::<_, CalculationResult>(&query)
            .bind(request_id)
            .fetch_optional(pool)
            .await
    }

    /// Placement rows of a result joined with their items, in insert order.
    pub async fn placed_items(
        pool: &PgPool,
        result_id: DbId,
    ) -> Result<Vec<PlacedItemRow>, sqlx::Error> {
        sqlx::query_as::<_, PlacedItemRow>(
            "SELECT p.id, p.item_id, b.item_name, p.position_x, p.position_y, p.position_z,
                    p.rotation_type, i.length, i.width, i.height, i.weight,
                    g.color
             FROM placed_items p
             JOIN loaded_boxes b ON b.id = p.loaded_box_id
             JOIN items i ON i.id = p.item_id
             LEFT JOIN item_groups g ON g.id = i.group_id
             WHERE p.result_id = $1
             ORDER BY p.id",
        )
        .bind(result_id)
        .fetch_all(pool)
        .await
    }
}
