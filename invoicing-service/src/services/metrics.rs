//! Prometheus metrics for invoicing-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Invoices created, by initial status.
pub static INVOICES_CREATED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoicing_invoices_created_total",
        "Total number of invoices created by status",
        &["status"]
    )
    .expect("Failed to register invoices_created_total")
});

/// Accepted status changes.
pub static STATUS_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoicing_status_transitions_total",
        "Total number of invoice status transitions",
        &["from", "to"]
    )
    .expect("Failed to register status_transitions_total")
});

/// Reminders persisted by the scheduler.
pub static REMINDERS_SCHEDULED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoicing_reminders_scheduled_total",
        "Total number of reminders scheduled by type",
        &["reminder_type"]
    )
    .expect("Failed to register reminders_scheduled_total")
});

/// Per-reminder dispatcher outcomes.
pub static REMINDER_DISPATCH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoicing_reminder_dispatch_total",
        "Reminder dispatch outcomes",
        &["outcome"] // sent, skipped, claimed_elsewhere, retry_scheduled, dead_lettered, error
    )
    .expect("Failed to register reminder_dispatch_total")
});

/// Reminders that exhausted their attempts.
pub static REMINDERS_DEAD_LETTERED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoicing_reminders_dead_lettered_total",
        "Total number of reminders moved to failed",
        &["reason"]
    )
    .expect("Failed to register reminders_dead_lettered_total")
});

/// Dispatcher run duration.
pub static DISPATCH_RUN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "invoicing_dispatch_run_duration_seconds",
        "Reminder dispatcher run duration in seconds",
        &["result"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("Failed to register dispatch_run_duration")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoicing_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "invoicing_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Invoiced amount in minor units, by currency.
pub static INVOICE_AMOUNT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoicing_invoice_amount_total",
        "Total invoiced amount in minor units by currency",
        &["currency"]
    )
    .expect("Failed to register invoice_amount_total")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&INVOICES_CREATED_TOTAL);
    Lazy::force(&STATUS_TRANSITIONS_TOTAL);
    Lazy::force(&REMINDERS_SCHEDULED_TOTAL);
    Lazy::force(&REMINDER_DISPATCH_TOTAL);
    Lazy::force(&REMINDERS_DEAD_LETTERED_TOTAL);
    Lazy::force(&DISPATCH_RUN_DURATION);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&INVOICE_AMOUNT_TOTAL);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
