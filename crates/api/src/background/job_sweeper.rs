//! Periodic removal of expired job correlations.
//!
//! Entries whose stream never delivered a `done` event stay registered so
//! the client can subscribe again; this sweep bounds how long they linger.

use std::sync::Arc;
use std::time::Duration;

use loadplan_core::job_registry::JobRegistry;
use tokio_util::sync::CancellationToken;

/// How often the sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(jobs: Arc<dyn JobRegistry>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Job registry sweeper started");

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job registry sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                match jobs.sweep_expired().await {
                    Ok(0) => tracing::debug!("Job sweep: nothing expired"),
                    Ok(removed) => tracing::info!(removed, "Job sweep: removed expired entries"),
                    Err(e) => tracing::error!(error = %e, "Job sweep failed"),
                }
            }
        }
    }
}
