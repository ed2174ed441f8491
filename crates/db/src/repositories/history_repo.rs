//! Repository for `history_rows` and the cascade that runs when one is
//! deleted.
//!
//! Deleting a history row removes everything derived from its
//! calculation, children before parents, inside the caller's transaction
//! so a failure leaves nothing half-deleted.

use loadplan_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::history::{CascadeReport, HistoryRow};

/// Column list for history_rows queries.
const COLUMNS: &str = "id, calculation_id, request_id, result_id, user_id, algorithm, \
    activity_name, container_id, constraints_id, created_at";

pub struct HistoryRepo;

impl HistoryRepo {
    /// Write the history row for a persisted result, copying the
    /// calculation's metadata.
    pub async fn create(
        conn: &mut PgConnection,
        calculation_id: DbId,
        request_id: DbId,
        result_id: DbId,
    ) -> Result<HistoryRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO history_rows
                (calculation_id, request_id, result_id, user_id, algorithm, activity_name,
                 container_id, constraints_id)
             SELECT c.id, $2, $3, c.user_id, c.algorithm, c.activity_name,
                    c.container_id, c.constraints_id
             FROM calculations c
             WHERE c.id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, HistoryRow>(&query)
            .bind(calculation_id)
            .bind(request_id)
            .bind(result_id)
            .fetch_one(&mut *conn)
            .await
    }

    /// Find the history row of a calculation.
    pub async fn find_by_calculation(
        pool: &PgPool,
        calculation_id: DbId,
    ) -> Result<Option<HistoryRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM history_rows WHERE calculation_id = $1");
        sqlx::query_as::<_, HistoryRow>(&query)
            .bind(calculation_id)
            .fetch_optional(pool)
            .await
    }

    /// Delete a calculation's history anchor and cascade over everything
    /// derived from the calculation, in one transaction.
    ///
    /// Returns `None`, with nothing deleted, when the calculation has no
    /// history row.
    pub async fn delete_calculation(
        pool: &PgPool,
        calculation_id: DbId,
    ) -> Result<Option<CascadeReport>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let target: Option<(Option<DbId>, Option<DbId>)> = sqlx::query_as(
            "SELECT container_id, constraints_id FROM calculations WHERE id = $1 FOR UPDATE",
        )
        .bind(calculation_id)
        .fetch_optional(&mut *tx)
        .await?;

        let deleted: Vec<(Option<DbId>, Option<DbId>, Option<DbId>)> = sqlx::query_as(
            "DELETE FROM history_rows WHERE calculation_id = $1
             RETURNING request_id, container_id, constraints_id",
        )
        .bind(calculation_id)
        .fetch_all(&mut *tx)
        .await?;

        if deleted.is_empty() {
            tx.rollback().await?;
            return Ok(None);
        }

        let (container_id, constraints_id) = match target {
            Some(ids) => ids,
            None => deleted
                .first()
                .map(|(_, container, constraints)| (*container, *constraints))
                .unwrap_or_default(),
        };
        let anchored_requests: Vec<DbId> = deleted.iter().filter_map(|(req, _, _)| *req).collect();

        let mut report = cascade(
            &mut *tx,
            calculation_id,
            container_id,
            constraints_id,
            &anchored_requests,
        )
        .await?;
        report.history_rows = deleted.len() as u64;

        tx.commit().await?;

        tracing::info!(
            calculation_id,
            history_rows = report.history_rows,
            results = report.results,
            placed_items = report.placed_items,
            items = report.items,
            "Calculation deleted with derived data",
        );
        Ok(Some(report))
    }
}

/// Remove every row derived from a calculation, children first.
async fn cascade(
    conn: &mut PgConnection,
    calculation_id: DbId,
    container_id: Option<DbId>,
    constraints_id: Option<DbId>,
    anchored_requests: &[DbId],
) -> Result<CascadeReport, sqlx::Error> {
    let mut report = CascadeReport::default();

    // Requests tied to the calculation directly, through the history
    // anchor, or through its container.
    let request_ids: Vec<DbId> = sqlx::query_scalar(
        "SELECT id FROM calculation_requests
         WHERE calculation_id = $1
            OR id = ANY($2)
            OR (calculation_id IS NULL AND container_id = $3)",
    )
    .bind(calculation_id)
    .bind(anchored_requests)
    .bind(container_id)
    .fetch_all(&mut *conn)
    .await?;

    report.placed_items = sqlx::query(
        "DELETE FROM placed_items
         WHERE result_id IN (SELECT id FROM calculation_results WHERE request_id = ANY($1))",
    )
    .bind(&request_ids)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    report.loaded_boxes = sqlx::query(
        "DELETE FROM loaded_boxes
         WHERE result_id IN (SELECT id FROM calculation_results WHERE request_id = ANY($1))",
    )
    .bind(&request_ids)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    report.results = sqlx::query("DELETE FROM calculation_results WHERE request_id = ANY($1)")
        .bind(&request_ids)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    report.requests = sqlx::query("DELETE FROM calculation_requests WHERE id = ANY($1)")
        .bind(&request_ids)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    report.groups = sqlx::query("DELETE FROM groups WHERE calculation_id = $1")
        .bind(calculation_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    report.jobs = sqlx::query("DELETE FROM calculation_jobs WHERE calculation_id = $1")
        .bind(calculation_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    report.calculations = sqlx::query("DELETE FROM calculations WHERE id = $1")
        .bind(calculation_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    // Shared parents go only once no other calculation references them.
    if let Some(container_id) = container_id {
        let orphaned: bool = sqlx::query_scalar(
            "SELECT NOT EXISTS (SELECT 1 FROM calculations WHERE container_id = $1)",
        )
        .bind(container_id)
        .fetch_one(&mut *conn)
        .await?;

        if orphaned {
            report.placed_items += sqlx::query(
                "DELETE FROM placed_items
                 WHERE item_id IN (SELECT id FROM items WHERE container_id = $1)",
            )
            .bind(container_id)
            .execute(&mut *conn)
            .await?
            .rows_affected();

            report.loaded_boxes += sqlx::query(
                "DELETE FROM loaded_boxes
                 WHERE item_id IN (SELECT id FROM items WHERE container_id = $1)",
            )
            .bind(container_id)
            .execute(&mut *conn)
            .await?
            .rows_affected();

            report.items = sqlx::query("DELETE FROM items WHERE container_id = $1")
                .bind(container_id)
                .execute(&mut *conn)
                .await?
                .rows_affected();

            report.containers = sqlx::query("DELETE FROM containers WHERE id = $1")
                .bind(container_id)
                .execute(&mut *conn)
                .await?
                .rows_affected();
        }
    }

    if let Some(constraints_id) = constraints_id {
        report.constraints = sqlx::query(
            "DELETE FROM constraints
             WHERE id = $1
               AND NOT EXISTS (SELECT 1 FROM calculations WHERE constraints_id = $1)",
        )
        .bind(constraints_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    }

    Ok(report)
}
