//! Shared harness: boots the HTTP application on a random port over the
//! in-memory store, a mock email transport and a fixed clock.

#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use invoicing_service::config::InvoicingConfig;
use invoicing_service::models::{Customer, NewCustomer};
use invoicing_service::services::{
    Clock, FixedClock, InvoiceStore, MemoryStore, MockEmailTransport, ReminderDispatcher,
    TransitionPolicy,
};
use invoicing_service::startup::Application;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub const CRON_SECRET: &str = "test-cron-secret";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// 2025-04-01 08:00 UTC.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 1, 8, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub store: Arc<MemoryStore>,
    pub transport: Arc<MockEmailTransport>,
    pub clock: Arc<FixedClock>,
    pub dispatcher: Arc<ReminderDispatcher>,
    pub organization_id: Uuid,
    pub actor_id: Uuid,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    pub async fn spawn_strict() -> Self {
        Self::spawn_with(|config| {
            config.invoicing.transition_policy = TransitionPolicy::Strict;
        })
        .await
    }

    /// Spawn with adjustments applied on top of the test configuration.
    pub async fn spawn_with(configure: impl FnOnce(&mut InvoicingConfig)) -> Self {
        let mut config = InvoicingConfig::default();
        config.common.port = 0; // Random port for testing
        config.reminders.cron_secret = CRON_SECRET.to_string();
        config.payment_webhook_secret = WEBHOOK_SECRET.to_string();
        configure(&mut config);

        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(MockEmailTransport::new());
        let clock = Arc::new(FixedClock::new(test_now()));

        let app = Application::build_with_components(
            config,
            store.clone(),
            transport.clone(),
            clock.clone(),
        )
        .await
        .expect("Failed to build test application");

        let port = app.port();
        let dispatcher = app.state().dispatcher.clone();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(app.run_until_stopped(std::future::pending()));

        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        }

        TestApp {
            address,
            port,
            store,
            transport,
            clock,
            dispatcher,
            organization_id: Uuid::new_v4(),
            actor_id: Uuid::new_v4(),
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Request carrying this app's tenant headers.
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.request_as(self.organization_id, method, path)
    }

    pub fn request_as(
        &self,
        organization_id: Uuid,
        method: reqwest::Method,
        path: &str,
    ) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("x-organization-id", organization_id.to_string())
            .header("x-actor-id", self.actor_id.to_string())
    }

    pub async fn seed_customer(&self, email: Option<&str>) -> Customer {
        self.seed_customer_in(self.organization_id, email).await
    }

    pub async fn seed_customer_in(&self, organization_id: Uuid, email: Option<&str>) -> Customer {
        self.store
            .create_customer(&NewCustomer {
                organization_id,
                name: "Acme Ltd".to_string(),
                email: email.map(str::to_string),
            })
            .await
            .expect("Failed to seed customer")
    }

    /// Create an invoice over HTTP and return its JSON body.
    pub async fn create_invoice(&self, customer_id: Uuid, due_date: NaiveDate) -> Value {
        let response = self
            .request(reqwest::Method::POST, "/invoices")
            .json(&invoice_body(customer_id, due_date))
            .send()
            .await
            .expect("Failed to execute request.");
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        response.json().await.expect("Failed to parse JSON")
    }

    pub async fn schedule_reminder(&self, invoice_id: &str, body: Value) -> reqwest::Response {
        self.request(
            reqwest::Method::POST,
            &format!("/invoices/{}/reminders", invoice_id),
        )
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request.")
    }

    pub async fn trigger_dispatch(&self, secret: Option<&str>) -> reqwest::Response {
        let mut request = self.client.post(self.url("/internal/reminders/process"));
        if let Some(secret) = secret {
            request = request.bearer_auth(secret);
        }
        request.send().await.expect("Failed to execute request.")
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// Four hours at 150.00 plus a 82.40 expense, 10% tax.
pub fn invoice_body(customer_id: Uuid, due_date: NaiveDate) -> Value {
    json!({
        "customer_id": customer_id,
        "line_items": [
            { "description": "Consulting", "quantity": "4", "rate": "150.00" },
            { "description": "Travel", "quantity": "1", "rate": "82.40" }
        ],
        "tax_rate": "10",
        "due_date": due_date,
        "payment_terms": "net_30"
    })
}
