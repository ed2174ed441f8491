use axum::routing::{get, post};
use axum::Router;

use crate::handlers::calculation;
use crate::state::AppState;

/// Calculation routes, mounted at `/calculations`. Submit is mounted
/// separately by [`submit_router`].
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(calculation::list))
        .route("/cancel", post(calculation::cancel))
        .route("/stream/{job_id}", get(calculation::stream))
        .route(
            "/{id}",
            get(calculation::get_by_id).delete(calculation::delete),
        )
}

/// The submit route, kept apart so it can carry its own deadline.
pub fn submit_router() -> Router<AppState> {
    Router::new().route("/calculations", post(calculation::submit))
}
