//! Document recording integration tests.

mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::TestHarness;
use lexmeter_core::{DocumentId, UserId};

#[tokio::test]
async fn deleting_a_document_returns_its_credit() {
    let harness = TestHarness::new();

    let body: Value = harness.record_document().await.json();
    let document_id = body["document"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["document"]["title"], "lease.pdf");
    assert_eq!(harness.usage().await["remaining_credits"], 0);

    let response = harness
        .server
        .delete(&format!("/v1/documents/{document_id}"))
        .add_header("authorization", harness.user_auth_header())
        .await;
    response.assert_status_ok();
    let deleted: Value = response.json();
    assert!(deleted["deleted_at"].is_string());

    assert_eq!(harness.usage().await["remaining_credits"], 1);
}

#[tokio::test]
async fn other_users_documents_are_not_visible() {
    let harness = TestHarness::new();
    let body: Value = harness.record_document().await.json();
    let document_id = body["document"]["id"].as_str().unwrap().to_string();

    let response = harness
        .server
        .delete(&format!("/v1/documents/{document_id}"))
        .add_header("authorization", TestHarness::auth_header_for(&UserId::generate()))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    assert_eq!(harness.usage().await["used"], 1);
}

#[tokio::test]
async fn missing_and_malformed_ids() {
    let harness = TestHarness::new();

    harness
        .server
        .delete(&format!("/v1/documents/{}", DocumentId::generate()))
        .add_header("authorization", harness.user_auth_header())
        .await
        .assert_status(StatusCode::NOT_FOUND);

    harness
        .server
        .delete("/v1/documents/not-an-id")
        .add_header("authorization", harness.user_auth_header())
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_title_is_rejected() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/documents")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "title": "x".repeat(600) }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(harness.usage().await["used"], 0);
}
