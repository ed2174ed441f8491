//! Integration tests for `POST /api/calculations/cancel`.

mod common;

use axum::http::StatusCode;
use common::{body_json, get, post_json};
use loadplan_core::job_registry::JobRegistry;
use serde_json::json;

const CANCEL: &str = "/api/calculations/cancel";

#[tokio::test]
async fn cancel_requires_user_header() {
    let solver = common::spawn_fake_solver().await;
    let test = common::build_test_app(common::unreachable_pool(), solver);

    let response = post_json(test.app, CANCEL, None, json!({"job_id": "job-42"})).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn cancel_without_job_id_is_bad_request() {
    let solver = common::spawn_fake_solver().await;
    let test = common::build_test_app(common::unreachable_pool(), solver);

    let response = post_json(test.app.clone(), CANCEL, Some(1), json!({})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json(test.app, CANCEL, Some(1), json!({"job_id": "   "})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn cancel_unknown_job_returns_404() {
    let solver = common::spawn_fake_solver().await;
    let test = common::build_test_app(common::unreachable_pool(), solver);

    let response = post_json(test.app, CANCEL, Some(1), json!({"job_id": "job-nobody"})).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rejected_cancel_returns_502_and_keeps_job() {
    let solver = common::spawn_fake_solver().await;
    let test = common::build_test_app(common::unreachable_pool(), solver);
    test.jobs.put("job-stuck", 21).await.unwrap();

    let response = post_json(test.app, CANCEL, Some(1), json!({"job_id": "job-stuck"})).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(test.jobs.get("job-stuck").await.unwrap(), Some(21));
}

#[tokio::test]
async fn successful_cancel_forgets_job() {
    let solver = common::spawn_fake_solver().await;
    let test = common::build_test_app(common::unreachable_pool(), solver);
    test.jobs.put("job-42", 22).await.unwrap();

    let response = post_json(test.app.clone(), CANCEL, Some(1), json!({"job_id": "job-42"})).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["job_id"], "job-42");
    assert_eq!(json["data"]["status"], "cancelled");
    assert_eq!(test.jobs.get("job-42").await.unwrap(), None);

    // A cancelled job can no longer be streamed.
    let response = get(test.app, "/api/calculations/stream/job-42").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
