//! Handlers for calculation submission, job streaming and cancellation,
//! and the caller's calculation history.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use loadplan_core::calculation::{is_async_algorithm, CalculationInput};
use loadplan_core::error::CoreError;
use loadplan_core::job_registry;
use loadplan_core::reconcile::ResultSummary;
use loadplan_core::result_view::{PlacedItemView, ResultView};
use loadplan_core::types::DbId;
use loadplan_db::models::calculation::{Calculation, CalculationDetail};
use loadplan_db::models::result::PlacedItemRow;
use loadplan_db::repositories::{
    CalculationRepo, CalculationRequestRepo, HistoryRepo, ResultRepo, UserRepo,
};
use loadplan_solver::pump;

use crate::error::{AppError, AppResult};
use crate::ingest;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Lines buffered between the upstream reader and the client body.
const STREAM_CHANNEL_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Body of `POST /calculations/cancel`.
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub job_id: Option<String>,
}

/// Response for a started asynchronous job.
#[derive(Debug, Serialize)]
pub struct StartedJob {
    pub job_id: String,
    pub calculation_id: DbId,
}

#[derive(Debug, Serialize)]
pub struct CancelledJob {
    pub job_id: String,
    pub status: &'static str,
}

/// A stored calculation with its input snapshot and result.
#[derive(Debug, Serialize)]
pub struct CalculationView {
    #[serde(flatten)]
    pub detail: CalculationDetail,
    pub result: Option<ResultView>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Load a calculation the caller owns: 404 if absent, 403 if not theirs.
async fn ensure_owned_calculation(
    state: &AppState,
    id: DbId,
    user: AuthUser,
) -> AppResult<Calculation> {
    let calculation = CalculationRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Calculation",
            id,
        }))?;

    if calculation.user_id != user.user_id {
        return Err(AppError::Core(CoreError::Forbidden(
            "Calculation belongs to another user".into(),
        )));
    }
    Ok(calculation)
}

fn view_from_rows(id: DbId, summary: ResultSummary, rows: Vec<PlacedItemRow>) -> ResultView {
    ResultView {
        id,
        fill_rate: summary.fill_rate,
        total_weight: summary.total_weight,
        placed_items: rows
            .into_iter()
            .map(|row| PlacedItemView {
                id: row.item_name,
                x: row.position_x,
                y: row.position_y,
                z: row.position_z,
                rotation: row.rotation_type,
                length: Some(row.length),
                width: Some(row.width),
                height: Some(row.height),
                weight: Some(row.weight),
                color: row.color,
            })
            .collect(),
    }
}

/// Locate and rebuild the stored result of a calculation.
async fn load_result(state: &AppState, calculation: &Calculation) -> AppResult<Option<ResultView>> {
    let request = CalculationRequestRepo::find_for_calculation(
        &state.pool,
        calculation.id,
        calculation.container_id,
        &calculation.algorithm,
        calculation.created_at,
    )
    .await?;
    let Some(request) = request else {
        return Ok(None);
    };

    let Some(result) = ResultRepo::find_by_request(&state.pool, request.id).await? else {
        return Ok(None);
    };

    let summary = ResultSummary {
        fill_rate: result.fill_rate,
        total_weight: result.total_weight,
    };
    let view = match &result.raw_payload {
        Some(payload) => ResultView::from_payload(
            result.id,
            summary,
            payload,
            state.persister.reconciler().policy(),
        ),
        None => {
            let rows = ResultRepo::placed_items(&state.pool, result.id).await?;
            view_from_rows(result.id, summary, rows)
        }
    };
    Ok(Some(view))
}

// ---------------------------------------------------------------------------
// POST /calculations
// ---------------------------------------------------------------------------

/// Store a calculation and run it.
///
/// Asynchronous algorithms start a job and return its id; the result is
/// stored when the job's stream delivers it. Other algorithms run
/// synchronously: the compute service's status and body are returned as
/// received, and a successful result is stored on the way through.
pub async fn submit(
    State(state): State<AppState>,
    user: AuthUser,
    Json(mut input): Json<CalculationInput>,
) -> AppResult<Response> {
    input.prepare()?;

    if !UserRepo::exists(&state.pool, user.user_id).await? {
        return Err(AppError::Core(CoreError::Unauthorized("Unknown user".into())));
    }

    let calculation = CalculationRepo::create(&state.pool, user.user_id, &input).await?;
    tracing::info!(
        calculation_id = calculation.id,
        user_id = user.user_id,
        algorithm = %calculation.algorithm,
        "Calculation stored",
    );

    if is_async_algorithm(&input.algorithm, &state.config.async_algorithms) {
        let job_id = state.solver.start_job(&input).await?;
        state.jobs.put(&job_id, calculation.id).await?;
        tracing::info!(job_id = %job_id, calculation_id = calculation.id, "Job started");

        return Ok(Json(DataResponse {
            data: StartedJob {
                job_id,
                calculation_id: calculation.id,
            },
        })
        .into_response());
    }

    let reply = state.solver.calculate(&input).await?;
    if reply.is_success() {
        match serde_json::from_slice::<serde_json::Value>(&reply.body) {
            Ok(payload) => {
                if let Err(e) = state
                    .persister
                    .persist(&state.pool, calculation.id, &payload)
                    .await
                {
                    tracing::error!(
                        calculation_id = calculation.id,
                        error = %e,
                        "Failed to persist synchronous result",
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    calculation_id = calculation.id,
                    error = %e,
                    "Synchronous result is not JSON, not storing it",
                );
            }
        }
    } else {
        tracing::warn!(
            calculation_id = calculation.id,
            status = reply.status,
            "Compute service returned an error for synchronous calculation",
        );
    }

    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
    Ok((
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        reply.body,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// GET /calculations/stream/{job_id}
// ---------------------------------------------------------------------------

/// Proxy a job's event stream to the client.
///
/// Every upstream line is forwarded as soon as it is read. If the client
/// disconnects, the upstream is still read until the `done` event, so its
/// payload is stored either way.
pub async fn stream(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Response> {
    let calculation_id = job_registry::require(state.jobs.as_ref(), &job_id).await?;
    let upstream = state.solver.open_stream(&job_id).await?;
    tracing::info!(job_id = %job_id, calculation_id, "Proxying job stream");

    let (tx, rx) = mpsc::channel::<String>(STREAM_CHANNEL_CAPACITY);
    let idle = state.config.stream_idle_timeout();
    tokio::spawn(async move {
        let outcome = pump(upstream.bytes_stream(), tx, idle).await;
        ingest::handle_outcome(&state, &job_id, calculation_id, outcome).await;
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        body,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// POST /calculations/cancel
// ---------------------------------------------------------------------------

/// Cancel a running job.
///
/// The registry entry is removed only after the compute service confirms
/// the cancel; on failure the job stays registered so its result can still
/// be stored.
pub async fn cancel(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CancelRequest>,
) -> AppResult<impl IntoResponse> {
    let job_id = body
        .job_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("job_id is required".into()))?;

    let calculation_id = job_registry::require(state.jobs.as_ref(), &job_id).await?;

    if let Err(e) = state.solver.cancel(&job_id).await {
        tracing::warn!(job_id = %job_id, calculation_id, error = %e, "Cancel rejected, keeping job");
        return Err(e.into());
    }

    state.jobs.remove(&job_id).await?;
    tracing::info!(job_id = %job_id, calculation_id, user_id = user.user_id, "Job cancelled");

    Ok(Json(DataResponse {
        data: CancelledJob {
            job_id,
            status: "cancelled",
        },
    }))
}

// ---------------------------------------------------------------------------
// GET /calculations
// ---------------------------------------------------------------------------

/// List the caller's calculations, newest first.
pub async fn list(State(state): State<AppState>, user: AuthUser) -> AppResult<impl IntoResponse> {
    let calculations = CalculationRepo::list_by_user(&state.pool, user.user_id).await?;

    tracing::debug!(count = calculations.len(), user_id = user.user_id, "Listed calculations");

    Ok(Json(DataResponse { data: calculations }))
}

// ---------------------------------------------------------------------------
// GET /calculations/{id}
// ---------------------------------------------------------------------------

/// Fetch one calculation with its input snapshot and stored result.
pub async fn get_by_id(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let calculation = ensure_owned_calculation(&state, id, user).await?;
    let result = load_result(&state, &calculation).await?;
    let detail = CalculationRepo::load_detail(&state.pool, calculation).await?;

    Ok(Json(DataResponse {
        data: CalculationView { detail, result },
    }))
}

// ---------------------------------------------------------------------------
// DELETE /calculations/{id}
// ---------------------------------------------------------------------------

/// Delete a calculation's history entry and everything derived from it.
pub async fn delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    ensure_owned_calculation(&state, id, user).await?;

    HistoryRepo::delete_calculation(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "HistoryRow",
            id,
        }))?;

    Ok(StatusCode::NO_CONTENT)
}
