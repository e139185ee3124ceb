//! Health endpoint integration tests.

mod common;

use common::{start, TestHarness};

#[tokio::test]
async fn health_check_returns_ok() {
    let harness = TestHarness::new();

    let response = harness.server.get("/health").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "lexmeter");
}

#[tokio::test]
async fn health_check_reports_the_service_clock() {
    let harness = TestHarness::new();

    let body: serde_json::Value = harness.server.get("/health").await.json();
    let now: chrono::DateTime<chrono::Utc> =
        serde_json::from_value(body["now"].clone()).unwrap();
    assert_eq!(now, start());
}
