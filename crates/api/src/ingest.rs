//! Terminal handling for a proxied job stream.
//!
//! Once the pump stops, the outcome decides what happens to the job's
//! registry entry and whether a result is stored:
//!
//! - `done` with a JSON payload: reconcile and persist, then forget the job.
//! - `done` with an unparseable payload: log, discard, forget the job.
//! - anything else: keep the entry so the client can subscribe again.

use loadplan_core::event_stream::TerminalEvent;
use loadplan_core::types::DbId;
use loadplan_db::models::result::PersistedResult;
use loadplan_db::persister::PersistError;
use loadplan_solver::StreamOutcome;

use crate::state::AppState;

/// What terminal handling did for one stream.
#[derive(Debug)]
pub enum IngestOutcome {
    /// The result was stored.
    Persisted(PersistedResult),
    /// The `done` payload was unusable and dropped.
    Discarded,
    /// Storing the result failed; nothing was written.
    PersistFailed,
    /// The job was cancelled or forgotten while streaming; nothing stored.
    Untracked,
    /// The stream stopped before a `done` event; the job stays registered.
    Unfinished,
}

/// Act on how the stream for `job_id` ended.
pub async fn handle_outcome(
    state: &AppState,
    job_id: &str,
    calculation_id: DbId,
    outcome: StreamOutcome,
) -> IngestOutcome {
    let event = match outcome {
        StreamOutcome::Terminal(event) => event,
        StreamOutcome::Ended => {
            tracing::info!(job_id, calculation_id, "Job stream ended without a result");
            return IngestOutcome::Unfinished;
        }
        StreamOutcome::ClientGone => {
            tracing::info!(
                job_id,
                calculation_id,
                "Client disconnected and job stream ended without a result",
            );
            return IngestOutcome::Unfinished;
        }
        StreamOutcome::Failed(e) => {
            tracing::warn!(job_id, calculation_id, error = %e, "Job stream read failed");
            return IngestOutcome::Unfinished;
        }
    };

    // A cancel that raced the stream wins: its result is not filed.
    match state.jobs.get(job_id).await {
        Ok(Some(current)) if current == calculation_id => {}
        Ok(_) => {
            tracing::info!(job_id, calculation_id, "Job no longer registered, dropping result");
            return IngestOutcome::Untracked;
        }
        Err(e) => {
            tracing::error!(job_id, calculation_id, error = %e, "Job registry lookup failed");
            return IngestOutcome::PersistFailed;
        }
    }

    let ingest = match event {
        TerminalEvent::Payload(payload) => {
            match state
                .persister
                .persist(&state.pool, calculation_id, &payload)
                .await
            {
                Ok(persisted) => {
                    if !persisted.unresolved.is_empty() {
                        tracing::warn!(
                            job_id,
                            calculation_id,
                            dropped = persisted.unresolved.len(),
                            "Placed items without a matching stored item were dropped",
                        );
                    }
                    IngestOutcome::Persisted(persisted)
                }
                Err(PersistError::AlreadyPersisted(_)) => {
                    tracing::warn!(job_id, calculation_id, "Result already stored, ignoring duplicate");
                    IngestOutcome::Discarded
                }
                Err(e) => {
                    tracing::error!(job_id, calculation_id, error = %e, "Failed to persist job result");
                    IngestOutcome::PersistFailed
                }
            }
        }
        TerminalEvent::Malformed { raw, error } => {
            tracing::warn!(
                job_id,
                calculation_id,
                error = %error,
                payload_len = raw.len(),
                "Discarding unparseable done payload",
            );
            IngestOutcome::Discarded
        }
    };

    if let Err(e) = state.jobs.remove(job_id).await {
        tracing::error!(job_id, error = %e, "Failed to remove finished job from registry");
    }
    ingest
}
