//! Postgres-backed [`JobRegistry`]: job correlations survive a restart
//! and are shared by every replica pointing at the same database.

use std::time::Duration;

use async_trait::async_trait;
use loadplan_core::error::CoreError;
use loadplan_core::job_registry::JobRegistry;
use loadplan_core::types::DbId;
use sqlx::PgPool;

use crate::models::job::CalculationJob;

pub struct PgJobRegistry {
    pool: PgPool,
    ttl: Option<Duration>,
}

impl PgJobRegistry {
    pub fn new(pool: PgPool, ttl: Option<Duration>) -> Self {
        Self { pool, ttl }
    }

    /// Every live entry, oldest first.
    pub async fn list(&self) -> Result<Vec<CalculationJob>, sqlx::Error> {
        sqlx::query_as::<_, CalculationJob>(
            "SELECT job_id, calculation_id, registered_at
             FROM calculation_jobs
             ORDER BY registered_at",
        )
        .fetch_all(&self.pool)
        .await
    }

    fn ttl_secs(&self) -> Option<f64> {
        self.ttl.map(|ttl| ttl.as_secs_f64())
    }
}

fn internal(e: sqlx::Error) -> CoreError {
    CoreError::Internal(format!("job registry: {e}"))
}

#[async_trait]
impl JobRegistry for PgJobRegistry {
    async fn put(&self, job_id: &str, calculation_id: DbId) -> Result<(), CoreError> {
        let previous: Option<DbId> = sqlx::query_scalar(
            "WITH old AS (SELECT calculation_id FROM calculation_jobs WHERE job_id = $1)
             INSERT INTO calculation_jobs (job_id, calculation_id, registered_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT (job_id) DO UPDATE
                 SET calculation_id = EXCLUDED.calculation_id,
                     registered_at = EXCLUDED.registered_at
             RETURNING (SELECT calculation_id FROM old)",
        )
        .bind(job_id)
        .bind(calculation_id)
        .fetch_one(&self.pool)
        .await
        .map_err(internal)?;

        if let Some(previous) = previous.filter(|p| *p != calculation_id) {
            tracing::warn!(
                job_id,
                previous_calculation_id = previous,
                calculation_id,
                "Job id re-registered against a different calculation",
            );
        }
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<DbId>, CoreError> {
        sqlx::query_scalar(
            "SELECT calculation_id FROM calculation_jobs
             WHERE job_id = $1
               AND ($2::FLOAT8 IS NULL OR registered_at > NOW() - make_interval(secs => $2))",
        )
        .bind(job_id)
        .bind(self.ttl_secs())
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)
    }

    async fn remove(&self, job_id: &str) -> Result<Option<DbId>, CoreError> {
        sqlx::query_scalar("DELETE FROM calculation_jobs WHERE job_id = $1 RETURNING calculation_id")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)
    }

    async fn sweep_expired(&self) -> Result<u64, CoreError> {
        let Some(ttl_secs) = self.ttl_secs() else {
            return Ok(0);
        };
        let result = sqlx::query(
            "DELETE FROM calculation_jobs
             WHERE registered_at <= NOW() - make_interval(secs => $1)",
        )
        .bind(ttl_secs)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(result.rows_affected())
    }
}
