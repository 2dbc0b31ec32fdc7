mod common;

use common::{date, TestApp};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

async fn invoice_due(app: &TestApp, due: chrono::NaiveDate) -> String {
    let customer = app.seed_customer(Some("billing@acme.test")).await;
    let created = app.create_invoice(customer.customer_id, due).await;
    created["invoice_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn before_due_reminder_is_scheduled_days_ahead_of_due_date() {
    let app = TestApp::spawn().await;
    let invoice_id = invoice_due(&app, date(2025, 4, 30)).await;

    let response = app
        .schedule_reminder(
            &invoice_id,
            json!({
                "reminder_type": "before_due",
                "days": 3,
                "email_template": "<p>Your invoice is due soon.</p>"
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["scheduled_date"], "2025-04-27T00:00:00Z");
    assert_eq!(body["status"], "scheduled");
    assert_eq!(body["attempts"], 0);
    assert_eq!(body["invoice_id"], invoice_id);
}

#[tokio::test]
async fn on_due_reminder_ignores_days() {
    let app = TestApp::spawn().await;
    let invoice_id = invoice_due(&app, date(2025, 4, 30)).await;

    let body: Value = app
        .schedule_reminder(
            &invoice_id,
            json!({
                "reminder_type": "on_due",
                "days": 5,
                "email_template": "<p>Due today.</p>"
            }),
        )
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(body["scheduled_date"], "2025-04-30T00:00:00Z");
    assert_eq!(body["days"], 0);
}

#[tokio::test]
async fn after_due_reminder_is_scheduled_after_due_date() {
    let app = TestApp::spawn().await;
    let invoice_id = invoice_due(&app, date(2025, 4, 30)).await;

    let body: Value = app
        .schedule_reminder(
            &invoice_id,
            json!({
                "reminder_type": "after_due",
                "days": 7,
                "email_template": "<p>Overdue.</p>"
            }),
        )
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(body["scheduled_date"], "2025-05-07T00:00:00Z");
}

#[tokio::test]
async fn reminder_in_the_past_is_rejected() {
    let app = TestApp::spawn().await;
    let invoice_id = invoice_due(&app, date(2025, 4, 3)).await;

    // 2025-03-29 is before the clock's 2025-04-01
    let response = app
        .schedule_reminder(
            &invoice_id,
            json!({
                "reminder_type": "before_due",
                "days": 5,
                "email_template": "<p>Too late.</p>"
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let reminders: Vec<Value> = app
        .request(
            Method::GET,
            &format!("/invoices/{}/reminders", invoice_id),
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(reminders.is_empty());
}

#[tokio::test]
async fn empty_template_is_rejected() {
    let app = TestApp::spawn().await;
    let invoice_id = invoice_due(&app, date(2025, 4, 30)).await;

    let response = app
        .schedule_reminder(
            &invoice_id,
            json!({ "reminder_type": "on_due", "email_template": "" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn reminder_for_unknown_invoice_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .schedule_reminder(
            &Uuid::new_v4().to_string(),
            json!({ "reminder_type": "on_due", "email_template": "<p>Hi</p>" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_returns_reminders_in_schedule_order() {
    let app = TestApp::spawn().await;
    let invoice_id = invoice_due(&app, date(2025, 4, 30)).await;

    for (reminder_type, days) in [("after_due", 3), ("before_due", 2), ("on_due", 0)] {
        let response = app
            .schedule_reminder(
                &invoice_id,
                json!({
                    "reminder_type": reminder_type,
                    "days": days,
                    "email_template": "<p>Reminder</p>"
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let reminders: Vec<Value> = app
        .request(
            Method::GET,
            &format!("/invoices/{}/reminders", invoice_id),
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let types: Vec<&str> = reminders
        .iter()
        .map(|r| r["reminder_type"].as_str().unwrap())
        .collect();
    assert_eq!(types, vec!["before_due", "on_due", "after_due"]);
}

#[tokio::test]
async fn cancelled_reminder_cannot_be_cancelled_again() {
    let app = TestApp::spawn().await;
    let invoice_id = invoice_due(&app, date(2025, 4, 30)).await;
    let reminder: Value = app
        .schedule_reminder(
            &invoice_id,
            json!({ "reminder_type": "on_due", "email_template": "<p>Hi</p>" }),
        )
        .await
        .json()
        .await
        .unwrap();
    let path = format!(
        "/reminders/{}/cancel",
        reminder["reminder_id"].as_str().unwrap()
    );

    let response = app.request(Method::POST, &path).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "cancelled");

    let response = app.request(Method::POST, &path).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn reminders_are_scoped_to_the_organization() {
    let app = TestApp::spawn().await;
    let invoice_id = invoice_due(&app, date(2025, 4, 30)).await;
    let reminder: Value = app
        .schedule_reminder(
            &invoice_id,
            json!({ "reminder_type": "on_due", "email_template": "<p>Hi</p>" }),
        )
        .await
        .json()
        .await
        .unwrap();

    let response = app
        .request_as(
            Uuid::new_v4(),
            Method::POST,
            &format!(
                "/reminders/{}/cancel",
                reminder["reminder_id"].as_str().unwrap()
            ),
        )
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
