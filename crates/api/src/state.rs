use std::sync::Arc;

use loadplan_core::job_registry::JobRegistry;
use loadplan_db::persister::ResultPersister;
use loadplan_solver::SolverApi;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: loadplan_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Compute service client.
    pub solver: SolverApi,
    /// Job id to calculation id correlation.
    pub jobs: Arc<dyn JobRegistry>,
    /// Reconciles and stores finished results.
    pub persister: ResultPersister,
}
