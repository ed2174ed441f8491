//! Repository for `calculations` and the input snapshot written with them.

use std::collections::HashMap;

use loadplan_core::calculation::{CalculationInput, DEFAULT_GROUP_COLOR};
use loadplan_core::reconcile::ItemCandidate;
use loadplan_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::calculation::{
    Calculation, CalculationDetail, CalculationSummary, ConstraintsRow, ContainerRow,
    GroupSnapshot, ItemRow,
};

/// Column list for calculations queries.
const COLUMNS: &str = "id, user_id, container_id, constraints_id, algorithm, activity_name, created_at";

/// Upper bound on the history list.
pub const HISTORY_LIMIT: i64 = 200;

pub struct CalculationRepo;

impl CalculationRepo {
    /// Store a submitted calculation with its container, constraints,
    /// group snapshot and items in one transaction.
    ///
    /// `input.algorithm` is stored as given, so callers normalize it first.
    pub async fn create(
        pool: &PgPool,
        user_id: DbId,
        input: &CalculationInput,
    ) -> Result<Calculation, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let (container_id,): (DbId,) = sqlx::query_as(
            "INSERT INTO containers (user_id, length, width, height, max_weight)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(user_id)
        .bind(input.container.length)
        .bind(input.container.width)
        .bind(input.container.height)
        .bind(input.container.max_weight)
        .fetch_one(&mut *tx)
        .await?;

        let flags = input.constraints;
        let (constraints_id,): (DbId,) = sqlx::query_as(
            "INSERT INTO constraints
                (enforce_load_capacity, enforce_stacking, enforce_priority, enforce_lifo)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(flags.enforce_load_capacity)
        .bind(flags.enforce_stacking)
        .bind(flags.enforce_priority)
        .bind(flags.enforce_lifo)
        .fetch_one(&mut *tx)
        .await?;

        let query = format!(
            "INSERT INTO calculations
                (user_id, container_id, constraints_id, algorithm, activity_name)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        let calculation = sqlx::query_as::<_, Calculation>(&query)
            .bind(user_id)
            .bind(container_id)
            .bind(constraints_id)
            .bind(&input.algorithm)
            .bind(&input.activity_name)
            .fetch_one(&mut *tx)
            .await?;

        // Group references on items may use either the group's client id
        // or its name.
        let mut group_ids: HashMap<&str, (DbId, &str)> = HashMap::new();
        for group in &input.groups {
            let item_group_id = upsert_item_group(&mut *tx, &group.name, &group.color).await?;
            group_ids.insert(group.id.as_str(), (item_group_id, group.name.as_str()));
            group_ids.insert(group.name.as_str(), (item_group_id, group.name.as_str()));

            sqlx::query(
                "INSERT INTO groups (calculation_id, group_id_string, name, color)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(calculation.id)
            .bind(&group.id)
            .bind(&group.name)
            .bind(&group.color)
            .execute(&mut *tx)
            .await?;
        }

        for item in &input.items {
            let group_ref = item.group.trim();
            let (group_id, name) = if group_ref.is_empty() {
                (None, item.id.as_str())
            } else if let Some((id, name)) = group_ids.get(group_ref) {
                (Some(*id), *name)
            } else {
                let id = ensure_item_group(&mut *tx, group_ref).await?;
                group_ids.insert(group_ref, (id, group_ref));
                (Some(id), group_ref)
            };

            sqlx::query(
                "INSERT INTO items
                    (container_id, external_id, name, length, width, height, weight,
                     quantity, group_id)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(container_id)
            .bind(&item.id)
            .bind(name)
            .bind(item.length)
            .bind(item.width)
            .bind(item.height)
            .bind(item.weight)
            .bind(item.quantity)
            .bind(group_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(calculation)
    }

    /// Find a calculation by its primary key.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Calculation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM calculations WHERE id = $1");
        sqlx::query_as::<_, Calculation>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// A user's calculations, newest first, with their latest result's
    /// summary when one exists.
    pub async fn list_by_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<CalculationSummary>, sqlx::Error> {
        sqlx::query_as::<_, CalculationSummary>(
            "SELECT c.id, c.algorithm, c.activity_name, c.container_id, c.created_at,
                    r.fill_rate, r.total_weight
             FROM calculations c
             LEFT JOIN LATERAL (
                 SELECT res.fill_rate, res.total_weight
                 FROM calculation_requests req
                 JOIN calculation_results res ON res.request_id = req.id
                 WHERE req.calculation_id = c.id
                 ORDER BY res.id DESC
                 LIMIT 1
             ) r ON true
             WHERE c.user_id = $1
             ORDER BY c.created_at DESC, c.id DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(HISTORY_LIMIT)
        .fetch_all(pool)
        .await
    }

    /// Load the stored input snapshot of a calculation.
    pub async fn load_detail(
        pool: &PgPool,
        calculation: Calculation,
    ) -> Result<CalculationDetail, sqlx::Error> {
        let container = match calculation.container_id {
            Some(container_id) => {
                sqlx::query_as::<_, ContainerRow>(
                    "SELECT id, length, width, height, max_weight FROM containers WHERE id = $1",
                )
                .bind(container_id)
                .fetch_optional(pool)
                .await?
            }
            None => None,
        };

        let constraints = match calculation.constraints_id {
            Some(constraints_id) => {
                sqlx::query_as::<_, ConstraintsRow>(
                    "SELECT id, enforce_load_capacity, enforce_stacking, enforce_priority,
                            enforce_lifo
                     FROM constraints WHERE id = $1",
                )
                .bind(constraints_id)
                .fetch_optional(pool)
                .await?
            }
            None => None,
        };

        let groups = sqlx::query_as::<_, GroupSnapshot>(
            "SELECT id, group_id_string, name, color FROM groups
             WHERE calculation_id = $1 ORDER BY id",
        )
        .bind(calculation.id)
        .fetch_all(pool)
        .await?;

        let items = match calculation.container_id {
            Some(container_id) => {
                sqlx::query_as::<_, ItemRow>(
                    "SELECT i.id, i.external_id, i.name, i.length, i.width, i.height,
                            i.weight, i.quantity, i.group_id,
                            g.name AS group_name, g.color AS group_color
                     FROM items i
                     LEFT JOIN item_groups g ON g.id = i.group_id
                     WHERE i.container_id = $1
                     ORDER BY i.id",
                )
                .bind(container_id)
                .fetch_all(pool)
                .await?
            }
            None => Vec::new(),
        };

        Ok(CalculationDetail {
            calculation,
            container,
            constraints,
            groups,
            items,
        })
    }

    /// Items placements may resolve to: those on `container_id`, in id order.
    pub async fn item_candidates(
        conn: &mut PgConnection,
        container_id: DbId,
    ) -> Result<Vec<ItemCandidate>, sqlx::Error> {
        let rows: Vec<(DbId, Option<String>, String)> = sqlx::query_as(
            "SELECT id, external_id, name FROM items WHERE container_id = $1 ORDER BY id",
        )
        .bind(container_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, external_id, name)| ItemCandidate {
                id,
                external_id,
                name,
            })
            .collect())
    }
}

/// Create or recolor the item group named `name`, returning its id.
async fn upsert_item_group(
    conn: &mut PgConnection,
    name: &str,
    color: &str,
) -> Result<DbId, sqlx::Error> {
    let (id,): (DbId,) = sqlx::query_as(
        "INSERT INTO item_groups (name, color) VALUES ($1, $2)
         ON CONFLICT (name) DO UPDATE SET color = EXCLUDED.color
         RETURNING id",
    )
    .bind(name)
    .bind(color)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

/// Look up the item group named `name`, creating it with the default
/// color when missing. An existing group keeps its color.
async fn ensure_item_group(conn: &mut PgConnection, name: &str) -> Result<DbId, sqlx::Error> {
    let (id,): (DbId,) = sqlx::query_as(
        "INSERT INTO item_groups (name, color) VALUES ($1, $2)
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
         RETURNING id",
    )
    .bind(name)
    .bind(DEFAULT_GROUP_COLOR)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}
