//! Persisting a finished calculation's result.
//!
//! One transaction writes the request row, the result row with the raw
//! payload, the history row, and a loaded-box plus placed-item pair per
//! resolved placement. Any failure rolls the whole unit back.

use loadplan_core::reconcile::ResultReconciler;
use loadplan_core::types::DbId;
use sqlx::PgPool;

use crate::models::result::PersistedResult;
use crate::repositories::{CalculationRepo, CalculationRequestRepo, HistoryRepo, ResultRepo};

/// Unique constraint guarding against a second result for one calculation.
const HISTORY_UNIQUE_CONSTRAINT: &str = "uq_history_rows_calculation_id";

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("Calculation {0} does not exist")]
    CalculationNotFound(DbId),

    #[error("Calculation {0} already has a stored result")]
    AlreadyPersisted(DbId),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for PersistError {
    fn from(e: sqlx::Error) -> Self {
        PersistError::Database(e)
    }
}

/// Writes reconciled results for calculations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultPersister {
    reconciler: ResultReconciler,
}

impl ResultPersister {
    pub fn new(reconciler: ResultReconciler) -> Self {
        Self { reconciler }
    }

    pub fn reconciler(&self) -> ResultReconciler {
        self.reconciler
    }

    /// Reconcile `payload` against the calculation's stored items and
    /// write everything in one transaction.
    pub async fn persist(
        &self,
        pool: &PgPool,
        calculation_id: DbId,
        payload: &serde_json::Value,
    ) -> Result<PersistedResult, PersistError> {
        let mut tx = pool.begin().await?;

        let request = CalculationRequestRepo::create_for_calculation(&mut *tx, calculation_id)
            .await?
            .ok_or(PersistError::CalculationNotFound(calculation_id))?;

        let candidates = match request.container_id {
            Some(container_id) => CalculationRepo::item_candidates(&mut *tx, container_id).await?,
            None => Vec::new(),
        };
        let reconciliation = self.reconciler.reconcile(payload, &candidates);

        let result = ResultRepo::create(&mut *tx, request.id, reconciliation.summary, payload).await?;

        let history = HistoryRepo::create(&mut *tx, calculation_id, request.id, result.id)
            .await
            .map_err(|e| {
                if is_violation_of(&e, HISTORY_UNIQUE_CONSTRAINT) {
                    PersistError::AlreadyPersisted(calculation_id)
                } else {
                    PersistError::Database(e)
                }
            })?;

        for placement in &reconciliation.placements {
            ResultRepo::add_placement(&mut *tx, result.id, placement).await?;
        }

        tx.commit().await?;

        tracing::info!(
            calculation_id,
            request_id = request.id,
            result_id = result.id,
            placed = reconciliation.placements.len(),
            unresolved = reconciliation.unresolved.len(),
            fill_rate = reconciliation.summary.fill_rate,
            "Calculation result persisted",
        );

        Ok(PersistedResult {
            calculation_id,
            request_id: request.id,
            result_id: result.id,
            history_id: history.id,
            placed_count: reconciliation.placements.len(),
            unresolved: reconciliation.unresolved,
        })
    }
}

fn is_violation_of(error: &sqlx::Error, constraint: &str) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.constraint() == Some(constraint))
}
