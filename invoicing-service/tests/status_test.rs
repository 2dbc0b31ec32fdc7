mod common;

use common::{date, TestApp};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

async fn set_status(app: &TestApp, invoice_id: &str, status: &str) -> reqwest::Response {
    app.request(Method::PATCH, &format!("/invoices/{}/status", invoice_id))
        .json(&json!({ "status": status }))
        .send()
        .await
        .expect("Failed to execute request.")
}

#[tokio::test]
async fn permissive_policy_allows_leaving_paid() {
    let app = TestApp::spawn().await;
    let customer = app.seed_customer(None).await;
    let created = app
        .create_invoice(customer.customer_id, date(2025, 4, 30))
        .await;
    let invoice_id = created["invoice_id"].as_str().unwrap();

    let paid: Value = set_status(&app, invoice_id, "paid").await.json().await.unwrap();
    assert_eq!(paid["status"], "paid");
    assert_eq!(paid["payment_date"], "2025-04-01T08:00:00Z");

    let response = set_status(&app, invoice_id, "open").await;
    assert_eq!(response.status(), StatusCode::OK);
    let reopened: Value = response.json().await.unwrap();
    assert_eq!(reopened["status"], "open");
    // The payment date survives leaving paid
    assert_eq!(reopened["payment_date"], "2025-04-01T08:00:00Z");
}

#[tokio::test]
async fn strict_policy_rejects_leaving_terminal_states() {
    let app = TestApp::spawn_strict().await;
    let customer = app.seed_customer(None).await;
    let created = app
        .create_invoice(customer.customer_id, date(2025, 4, 30))
        .await;
    let invoice_id = created["invoice_id"].as_str().unwrap();

    assert_eq!(
        set_status(&app, invoice_id, "open").await.status(),
        StatusCode::OK
    );
    assert_eq!(
        set_status(&app, invoice_id, "void").await.status(),
        StatusCode::OK
    );

    let response = set_status(&app, invoice_id, "open").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body: Value = app
        .request(Method::GET, &format!("/invoices/{}", invoice_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "void");
}

#[tokio::test]
async fn unknown_status_is_rejected() {
    let app = TestApp::spawn().await;
    let customer = app.seed_customer(None).await;
    let created = app
        .create_invoice(customer.customer_id, date(2025, 4, 30))
        .await;
    let invoice_id = created["invoice_id"].as_str().unwrap();

    // Overdue is derived, never set
    let response = set_status(&app, invoice_id, "overdue").await;
    assert!(response.status().is_client_error());
}
