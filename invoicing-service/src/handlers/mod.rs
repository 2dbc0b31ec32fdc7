//! HTTP handlers for invoicing-service.

pub mod context;
pub mod health;
pub mod internal;
pub mod invoices;
pub mod reminders;

pub use health::{health_check, metrics_endpoint, readiness_check};
