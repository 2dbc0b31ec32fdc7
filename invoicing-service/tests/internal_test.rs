mod common;

use common::{TestApp, CRON_SECRET};
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn cron_trigger_rejects_missing_or_wrong_secret() {
    let app = TestApp::spawn().await;

    for secret in [None, Some("wrong"), Some("test-cron-secreT")] {
        let response = app.trigger_dispatch(secret).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({ "success": false }));
    }
}

#[tokio::test]
async fn cron_trigger_with_secret_runs_dispatcher() {
    let app = TestApp::spawn().await;

    let response = app.trigger_dispatch(Some(CRON_SECRET)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "success": true }));
}

#[tokio::test]
async fn unset_cron_secret_rejects_everything() {
    let app = TestApp::spawn_with(|config| {
        config.reminders.cron_secret = String::new();
    })
    .await;

    let response = app
        .client
        .post(app.url("/internal/reminders/process"))
        .header("Authorization", "Bearer ")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
