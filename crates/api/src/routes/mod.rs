pub mod calculation;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree. Submit is mounted from [`submit_routes`].
///
/// Route hierarchy:
///
/// ```text
/// /calculations                      list (GET), submit (POST)
/// /calculations/cancel               cancel a running job (POST)
/// /calculations/stream/{job_id}      proxy a job's event stream (GET)
/// /calculations/{id}                 get, delete
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/calculations", calculation::router())
}

/// The `/api` routes that may wait on a synchronous solve.
pub fn submit_routes() -> Router<AppState> {
    calculation::submit_router()
}
