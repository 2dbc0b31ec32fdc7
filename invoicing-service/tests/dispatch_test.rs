mod common;

use chrono::Duration;
use common::{date, TestApp, CRON_SECRET};
use invoicing_service::models::{EmailReminder, ReminderStatus};
use invoicing_service::services::InvoiceStore;
use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

/// Invoice due 2025-04-10 with an on-due reminder for `email`.
async fn due_reminder(app: &TestApp, email: Option<&str>, template: &str) -> EmailReminder {
    let customer = app.seed_customer(email).await;
    let invoice = app
        .create_invoice(customer.customer_id, date(2025, 4, 10))
        .await;
    let response = app
        .schedule_reminder(
            invoice["invoice_id"].as_str().unwrap(),
            json!({ "reminder_type": "on_due", "email_template": template }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    response.json().await.unwrap()
}

async fn reload(app: &TestApp, reminder: &EmailReminder) -> EmailReminder {
    app.store
        .get_reminder(reminder.organization_id, reminder.reminder_id)
        .await
        .unwrap()
        .expect("Reminder disappeared")
}

#[tokio::test]
async fn due_reminder_is_sent_once() {
    let app = TestApp::spawn().await;
    let reminder = due_reminder(&app, Some("billing@acme.test"), "<p>Please pay</p>").await;
    app.advance(Duration::days(9));

    let response = app.trigger_dispatch(Some(CRON_SECRET)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "success": true }));

    let sent = app.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "billing@acme.test");
    assert_eq!(
        sent[0].subject,
        format!("Payment reminder for invoice {}", reminder.invoice_id)
    );
    assert_eq!(sent[0].html_body, "<p>Please pay</p>");

    let stored = reload(&app, &reminder).await;
    assert_eq!(stored.status, ReminderStatus::Sent);
    assert_eq!(stored.sent_date, Some(app.clock_now()));

    let invoice = app
        .store
        .get_invoice(reminder.organization_id, reminder.invoice_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(invoice.last_reminded_utc, Some(app.clock_now()));

    // A second run finds nothing to send
    let summary = app.dispatcher.run().await.unwrap();
    assert_eq!(summary.sent, 0);
    assert_eq!(app.transport.send_count(), 1);
}

#[tokio::test]
async fn reminder_is_not_sent_before_its_date() {
    let app = TestApp::spawn().await;
    let reminder = due_reminder(&app, Some("billing@acme.test"), "<p>Soon</p>").await;
    app.advance(Duration::days(8));

    let summary = app.dispatcher.run().await.unwrap();

    assert_eq!(summary.sent, 0);
    assert_eq!(summary.skipped, 1);
    assert_eq!(app.transport.send_count(), 0);
    assert_eq!(reload(&app, &reminder).await.status, ReminderStatus::Scheduled);
}

#[tokio::test]
async fn customer_without_email_is_skipped_and_kept() {
    let app = TestApp::spawn().await;
    let reminder = due_reminder(&app, None, "<p>Hello</p>").await;
    app.advance(Duration::days(9));

    let summary = app.dispatcher.run().await.unwrap();

    assert_eq!(summary.skipped, 1);
    let stored = reload(&app, &reminder).await;
    assert_eq!(stored.status, ReminderStatus::Scheduled);
    assert_eq!(stored.attempts, 0);
}

#[tokio::test]
async fn one_failing_reminder_does_not_abort_the_batch() {
    let app = TestApp::spawn().await;
    let failing = due_reminder(&app, Some("down@acme.test"), "<p>A</p>").await;
    let healthy = due_reminder(&app, Some("up@acme.test"), "<p>B</p>").await;
    app.transport.fail_for("down@acme.test");
    app.advance(Duration::days(9));

    let summary = app.dispatcher.run().await.unwrap();

    assert_eq!(summary.examined, 2);
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.retry_scheduled, 1);
    assert_eq!(reload(&app, &healthy).await.status, ReminderStatus::Sent);

    let failed = reload(&app, &failing).await;
    assert_eq!(failed.status, ReminderStatus::Scheduled);
    assert_eq!(failed.attempts, 1);
    assert!(failed.last_error.is_some());
}

#[tokio::test]
async fn reminder_is_dead_lettered_after_max_attempts() {
    let app = TestApp::spawn().await;
    let reminder = due_reminder(&app, Some("down@acme.test"), "<p>A</p>").await;
    app.transport.fail_for("down@acme.test");
    app.advance(Duration::days(9));

    for _ in 0..2 {
        let summary = app.dispatcher.run().await.unwrap();
        assert_eq!(summary.retry_scheduled, 1);
    }
    let summary = app.dispatcher.run().await.unwrap();
    assert_eq!(summary.dead_lettered, 1);

    let stored = reload(&app, &reminder).await;
    assert_eq!(stored.status, ReminderStatus::Failed);
    assert_eq!(stored.attempts, 3);

    // Dead letters are never retried, even once the transport recovers
    app.transport.recover("down@acme.test");
    let summary = app.dispatcher.run().await.unwrap();
    assert_eq!(summary.examined, 0);
    assert_eq!(app.transport.send_count(), 0);
}

#[tokio::test]
async fn invalid_recipient_is_dead_lettered_immediately() {
    let app = TestApp::spawn().await;
    let reminder = due_reminder(&app, Some("not-an-address"), "<p>A</p>").await;
    app.advance(Duration::days(9));

    let summary = app.dispatcher.run().await.unwrap();

    assert_eq!(summary.dead_lettered, 1);
    let stored = reload(&app, &reminder).await;
    assert_eq!(stored.status, ReminderStatus::Failed);
    assert_eq!(stored.attempts, 1);
}

#[tokio::test]
async fn slow_send_times_out_and_is_retried() {
    let app = TestApp::spawn_with(|config| {
        config.reminders.send_timeout_secs = 1;
    })
    .await;
    let reminder = due_reminder(&app, Some("slow@acme.test"), "<p>A</p>").await;
    app.advance(Duration::days(9));
    app.transport
        .set_delay(Some(std::time::Duration::from_millis(1500)));

    let summary = app.dispatcher.run().await.unwrap();

    assert_eq!(summary.sent, 0);
    assert_eq!(summary.retry_scheduled, 1);
    let stored = reload(&app, &reminder).await;
    assert_eq!(stored.status, ReminderStatus::Scheduled);
    assert_eq!(stored.attempts, 1);

    app.transport.set_delay(None);
    let summary = app.dispatcher.run().await.unwrap();
    assert_eq!(summary.sent, 1);
}

#[tokio::test]
async fn overlapping_runs_send_each_reminder_once() {
    let app = TestApp::spawn().await;
    for n in 0..5 {
        due_reminder(&app, Some(&format!("c{}@acme.test", n)), "<p>A</p>").await;
    }
    app.advance(Duration::days(9));
    app.transport
        .set_delay(Some(std::time::Duration::from_millis(50)));

    let (first, second) = tokio::join!(app.dispatcher.run(), app.dispatcher.run());
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.sent + second.sent, 5);
    assert_eq!(app.transport.send_count(), 5);
}

#[tokio::test]
async fn stale_claim_is_released_and_sent() {
    let app = TestApp::spawn().await;
    let reminder = due_reminder(&app, Some("billing@acme.test"), "<p>A</p>").await;
    app.advance(Duration::days(9));

    // A run that claimed the reminder and then died
    assert!(app
        .store
        .claim_reminder(reminder.reminder_id, app.clock_now())
        .await
        .unwrap());

    let summary = app.dispatcher.run().await.unwrap();
    assert_eq!(summary.released_stale, 0);
    assert_eq!(summary.sent, 0);

    app.advance(Duration::minutes(11));
    let summary = app.dispatcher.run().await.unwrap();
    assert_eq!(summary.released_stale, 1);
    assert_eq!(summary.sent, 1);
    assert_eq!(reload(&app, &reminder).await.status, ReminderStatus::Sent);
}

#[tokio::test]
async fn short_claim_ttl_never_releases_an_in_flight_send() {
    let app = TestApp::spawn_with(|config| {
        config.reminders.claim_ttl_secs = 1;
        config.reminders.send_timeout_secs = 5;
    })
    .await;
    let reminder = due_reminder(&app, Some("billing@acme.test"), "<p>A</p>").await;
    app.advance(Duration::days(9));
    app.transport
        .set_delay(Some(std::time::Duration::from_millis(400)));

    let dispatcher = app.dispatcher.clone();
    let first = tokio::spawn(async move { dispatcher.run().await });

    // Let the first run claim, then move past the configured TTL
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    app.advance(Duration::seconds(2));
    let second = app.dispatcher.run().await.unwrap();
    let first = first.await.unwrap().unwrap();

    assert_eq!(second.released_stale, 0);
    assert_eq!(second.sent, 0);
    assert_eq!(first.sent, 1);
    assert_eq!(app.transport.send_count(), 1);
    assert_eq!(reload(&app, &reminder).await.status, ReminderStatus::Sent);
}

#[tokio::test]
async fn due_reminder_is_sent_and_future_reminder_waits() {
    let app = TestApp::spawn().await;
    let customer = app.seed_customer(Some("billing@acme.test")).await;
    let past_due = app
        .create_invoice(customer.customer_id, date(2025, 4, 5))
        .await;
    let later = app
        .create_invoice(customer.customer_id, date(2025, 4, 30))
        .await;
    let due_now: EmailReminder = app
        .schedule_reminder(
            past_due["invoice_id"].as_str().unwrap(),
            json!({ "reminder_type": "after_due", "days": 1, "email_template": "<p>Overdue</p>" }),
        )
        .await
        .json()
        .await
        .unwrap();
    let not_yet: EmailReminder = app
        .schedule_reminder(
            later["invoice_id"].as_str().unwrap(),
            json!({ "reminder_type": "on_due", "email_template": "<p>Due</p>" }),
        )
        .await
        .json()
        .await
        .unwrap();
    // 2025-04-08 08:00: the after-due reminder (04-06) is due, the other is not
    app.advance(Duration::days(7));

    let summary = app.dispatcher.run().await.unwrap();

    assert_eq!(summary.examined, 2);
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(reload(&app, &due_now).await.status, ReminderStatus::Sent);
    let waiting = reload(&app, &not_yet).await;
    assert_eq!(waiting.status, ReminderStatus::Scheduled);
    assert_eq!(waiting.attempts, 0);

    let sent = app.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].html_body, "<p>Overdue</p>");
}

#[tokio::test]
async fn cancelled_reminder_is_never_sent() {
    let app = TestApp::spawn().await;
    let reminder = due_reminder(&app, Some("billing@acme.test"), "<p>A</p>").await;
    let response = app
        .request(
            reqwest::Method::POST,
            &format!("/reminders/{}/cancel", reminder.reminder_id),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    app.advance(Duration::days(9));

    app.dispatcher.run().await.unwrap();

    assert_eq!(app.transport.send_count(), 0);
}

#[tokio::test]
async fn deleting_customer_removes_invoices_and_reminders() {
    let app = TestApp::spawn().await;
    let reminder = due_reminder(&app, Some("billing@acme.test"), "<p>A</p>").await;
    let invoice = app
        .store
        .get_invoice(reminder.organization_id, reminder.invoice_id)
        .await
        .unwrap()
        .unwrap();

    assert!(app
        .store
        .delete_customer(app.organization_id, invoice.customer_id)
        .await
        .unwrap());

    assert!(app
        .store
        .get_invoice(app.organization_id, invoice.invoice_id)
        .await
        .unwrap()
        .is_none());
    assert!(app
        .store
        .get_reminder(app.organization_id, reminder.reminder_id)
        .await
        .unwrap()
        .is_none());

    app.advance(Duration::days(9));
    let summary = app.dispatcher.run().await.unwrap();
    assert_eq!(summary.examined, 0);
    // Unknown ids stay unknown
    assert!(app
        .store
        .get_reminder(app.organization_id, Uuid::new_v4())
        .await
        .unwrap()
        .is_none());
}
