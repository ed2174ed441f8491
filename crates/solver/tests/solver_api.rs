//! Integration tests for the compute-service client against an
//! in-process fake service.

use std::net::SocketAddr;
use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use loadplan_core::event_stream::TerminalEvent;
use loadplan_solver::{pump, SolverApi, SolverError, StreamOutcome};
use serde_json::{json, Value};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Fake compute service
// ---------------------------------------------------------------------------

async fn calculate(Json(body): Json<Value>) -> impl IntoResponse {
    if body["algorithm"] == "BROKEN" {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"detail": "bad input"})));
    }
    (StatusCode::OK, Json(json!({"fill_rate": 0.4, "echo": body["algorithm"]})))
}

async fn start(Json(body): Json<Value>) -> Json<Value> {
    match body["algorithm"].as_str() {
        Some("NO_ID") => Json(json!({"status": "started"})),
        Some("EMPTY_ID") => Json(json!({"job_id": "  "})),
        _ => Json(json!({"job_id": "job-42"})),
    }
}

async fn stream(Path(job_id): Path<String>) -> impl IntoResponse {
    if job_id != "job-42" {
        return (StatusCode::NOT_FOUND, "unknown job").into_response();
    }
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        "event: progress\ndata: {\"gen\":1}\n\nevent: done\ndata: {\"placed_items\":[]}\n\n",
    )
        .into_response()
}

async fn cancel(Path(job_id): Path<String>) -> impl IntoResponse {
    if job_id == "job-42" {
        (StatusCode::OK, Json(json!({"status": "cancelled"})))
    } else {
        (StatusCode::NOT_FOUND, Json(json!({"detail": "no such job"})))
    }
}

async fn spawn_fake_solver() -> SocketAddr {
    let app = Router::new()
        .route("/calculate/python", post(calculate))
        .route("/calculate/stream/start", post(start))
        .route("/calculate/stream/{job_id}", get(stream))
        .route("/calculate/stream/{job_id}/cancel", post(cancel));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_calculate_returns_status_and_body_verbatim() {
    let addr = spawn_fake_solver().await;
    let api = SolverApi::new(&format!("http://{addr}/calculate/python"));

    let reply = api.calculate(&json!({"algorithm": "PYTHON_BLF"})).await.unwrap();
    assert!(reply.is_success());
    let body: Value = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(body["echo"], "PYTHON_BLF");

    let reply = api.calculate(&json!({"algorithm": "BROKEN"})).await.unwrap();
    assert_eq!(reply.status, 422);
}

#[tokio::test]
async fn test_start_job_requires_job_id() {
    let addr = spawn_fake_solver().await;
    let api = SolverApi::new(&format!("http://{addr}"));

    assert_eq!(api.start_job(&json!({"algorithm": "PYTHON_GA"})).await.unwrap(), "job-42");
    assert_matches!(
        api.start_job(&json!({"algorithm": "NO_ID"})).await,
        Err(SolverError::MissingJobId)
    );
    assert_matches!(
        api.start_job(&json!({"algorithm": "EMPTY_ID"})).await,
        Err(SolverError::MissingJobId)
    );
}

#[tokio::test]
async fn test_open_stream_and_pump_to_done() {
    let addr = spawn_fake_solver().await;
    let api = SolverApi::new(&format!("http://{addr}"));

    let response = api.open_stream("job-42").await.unwrap();
    let (tx, mut rx) = mpsc::channel(16);
    let outcome = pump(response.bytes_stream(), tx, Duration::from_secs(5)).await;

    assert_matches!(
        outcome,
        StreamOutcome::Terminal(TerminalEvent::Payload(v)) if v == json!({"placed_items": []})
    );
    let mut forwarded = Vec::new();
    while let Some(line) = rx.recv().await {
        forwarded.push(line);
    }
    assert_eq!(forwarded.len(), 6);
    assert_eq!(forwarded[0], "event: progress\n");
}

#[tokio::test]
async fn test_open_stream_for_unknown_job_is_api_error() {
    let addr = spawn_fake_solver().await;
    let api = SolverApi::new(&format!("http://{addr}"));

    assert_matches!(
        api.open_stream("job-missing").await,
        Err(SolverError::ApiError { status: 404, .. })
    );
}

#[tokio::test]
async fn test_cancel_surfaces_non_success() {
    let addr = spawn_fake_solver().await;
    let api = SolverApi::new(&format!("http://{addr}"));

    api.cancel("job-42").await.unwrap();
    assert_matches!(
        api.cancel("job-7").await,
        Err(SolverError::ApiError { status: 404, body }) if body.contains("no such job")
    );
}

#[tokio::test]
async fn test_unreachable_service_is_request_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = SolverApi::new(&format!("http://{addr}"));
    assert_matches!(api.cancel("job-42").await, Err(SolverError::Request(_)));
}
