//! Repository for `calculation_requests`, including the link backfill for
//! rows written before requests carried their calculation id.

use loadplan_core::request_link::{pick_link, window_around, LinkCandidate};
use loadplan_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::request::{BackfillReport, CalculationRequest};

/// Column list for calculation_requests queries.
const COLUMNS: &str = "id, user_id, container_id, calculation_id, algorithm, \
    enforce_load_capacity, enforce_stacking, enforce_priority, enforce_lifo, created_at";

pub struct CalculationRequestRepo;

impl CalculationRequestRepo {
    /// Record a request for `calculation_id`, copying its owner, container,
    /// algorithm and constraint flags. Returns `None` when the calculation
    /// does not exist.
    pub async fn create_for_calculation(
        conn: &mut PgConnection,
        calculation_id: DbId,
    ) -> Result<Option<CalculationRequest>, sqlx::Error> {
        let query = format!(
            "INSERT INTO calculation_requests
                (user_id, container_id, calculation_id, algorithm,
                 enforce_load_capacity, enforce_stacking, enforce_priority, enforce_lifo)
             SELECT c.user_id, c.container_id, c.id, c.algorithm,
                    COALESCE(k.enforce_load_capacity, false),
                    COALESCE(k.enforce_stacking, false),
                    COALESCE(k.enforce_priority, false),
                    COALESCE(k.enforce_lifo, false)
             FROM calculations c
             LEFT JOIN constraints k ON k.id = c.constraints_id
             WHERE c.id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CalculationRequest>(&query)
            .bind(calculation_id)
            .fetch_optional(&mut *conn)
            .await
    }

    /// The request holding a calculation's result.
    ///
    /// Prefers a request linked by `calculation_id`. Failing that, falls
    /// back to the newest unlinked request on the same container and
    /// algorithm created within the link window around the calculation.
    pub async fn find_for_calculation(
        pool: &PgPool,
        calculation_id: DbId,
        container_id: Option<DbId>,
        algorithm: &str,
        created_at: Timestamp,
    ) -> Result<Option<CalculationRequest>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM calculation_requests
             WHERE calculation_id = $1
             ORDER BY id DESC
             LIMIT 1"
        );
        let linked = sqlx::query_as::<_, CalculationRequest>(&query)
            .bind(calculation_id)
            .fetch_optional(pool)
            .await?;
        if linked.is_some() {
            return Ok(linked);
        }

        let Some(container_id) = container_id else {
            return Ok(None);
        };
        let (start, end) = window_around(created_at);
        let query = format!(
            "SELECT {COLUMNS} FROM calculation_requests
             WHERE calculation_id IS NULL
               AND container_id = $1
               AND algorithm = $2
               AND created_at BETWEEN $3 AND $4
             ORDER BY created_at DESC
             LIMIT 1"
        );
        sqlx::query_as::<_, CalculationRequest>(&query)
            .bind(container_id)
            .bind(algorithm)
            .bind(start)
            .bind(end)
            .fetch_optional(pool)
            .await
    }

    /// Link unlinked requests to the calculation created nearest in time
    /// on the same container and algorithm.
    ///
    /// Requests with no candidate in the window, or with a tie for
    /// nearest, stay unlinked. Each link is a single guarded UPDATE, so
    /// running the backfill repeatedly or concurrently is safe.
    pub async fn backfill_calculation_links(pool: &PgPool) -> Result<BackfillReport, sqlx::Error> {
        let unlinked: Vec<(DbId, Option<DbId>, String, Timestamp)> = sqlx::query_as(
            "SELECT id, container_id, algorithm, created_at
             FROM calculation_requests
             WHERE calculation_id IS NULL
             ORDER BY id",
        )
        .fetch_all(pool)
        .await?;

        let mut report = BackfillReport::default();
        for (request_id, container_id, algorithm, created_at) in unlinked {
            report.scanned += 1;
            let Some(container_id) = container_id else {
                report.skipped += 1;
                continue;
            };

            let (start, end) = window_around(created_at);
            let rows: Vec<(DbId, Timestamp)> = sqlx::query_as(
                "SELECT id, created_at FROM calculations
                 WHERE container_id = $1
                   AND algorithm = $2
                   AND created_at BETWEEN $3 AND $4
                 ORDER BY id",
            )
            .bind(container_id)
            .bind(&algorithm)
            .bind(start)
            .bind(end)
            .fetch_all(pool)
            .await?;

            let candidates: Vec<LinkCandidate> = rows
                .into_iter()
                .map(|(calculation_id, created_at)| LinkCandidate {
                    calculation_id,
                    created_at,
                })
                .collect();

            let Some(calculation_id) = pick_link(created_at, &candidates) else {
                tracing::debug!(
                    request_id,
                    candidates = candidates.len(),
                    "No unambiguous calculation for request, leaving unlinked",
                );
                report.skipped += 1;
                continue;
            };

            let updated = sqlx::query(
                "UPDATE calculation_requests SET calculation_id = $2
                 WHERE id = $1 AND calculation_id IS NULL",
            )
            .bind(request_id)
            .bind(calculation_id)
            .execute(pool)
            .await?;

            if updated.rows_affected() == 1 {
                report.linked += 1;
            } else {
                report.skipped += 1;
            }
        }

        tracing::info!(
            scanned = report.scanned,
            linked = report.linked,
            skipped = report.skipped,
            "Calculation request link backfill finished",
        );
        Ok(report)
    }
}
