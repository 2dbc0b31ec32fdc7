//! Reminder dispatch.
//!
//! A run claims each due reminder before sending it: the claim is a
//! conditional `scheduled -> sending` update, so overlapping runs never send
//! the same reminder twice. One reminder failing never aborts the run.

use crate::error::InvoicingError;
use crate::models::{DueReminder, ReminderStatus};
use crate::services::clock::Clock;
use crate::services::email::{EmailMessage, EmailTransport, TransportError};
use crate::services::metrics::{
    DISPATCH_RUN_DURATION, ERRORS_TOTAL, REMINDERS_DEAD_LETTERED_TOTAL, REMINDER_DISPATCH_TOTAL,
};
use crate::services::store::InvoiceStore;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct DispatcherSettings {
    pub send_timeout: Duration,
    pub max_attempts: u32,
    /// A `sending` claim older than this is assumed abandoned.
    pub claim_ttl: Duration,
    pub concurrency: usize,
}

/// Headroom between the send timeout and the claim TTL, covering the store
/// write that records the outcome of a send.
pub const CLAIM_TTL_MARGIN: Duration = Duration::from_secs(30);

impl DispatcherSettings {
    /// Age after which a `sending` claim is released. Never shorter than a
    /// send can take, so a claim whose send is still in flight is kept.
    pub fn effective_claim_ttl(&self) -> Duration {
        self.claim_ttl.max(self.send_timeout + CLAIM_TTL_MARGIN)
    }
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(30),
            max_attempts: 3,
            claim_ttl: Duration::from_secs(600),
            concurrency: 8,
        }
    }
}

/// Counts for one dispatcher run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub released_stale: u64,
    pub examined: u32,
    pub sent: u32,
    pub skipped: u32,
    pub claimed_elsewhere: u32,
    pub retry_scheduled: u32,
    pub dead_lettered: u32,
    pub errors: u32,
}

/// Why a due reminder was left `scheduled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotYetDue,
    InvoiceMissing,
    NoCustomerEmail,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotYetDue => "not_yet_due",
            SkipReason::InvoiceMissing => "invoice_missing",
            SkipReason::NoCustomerEmail => "no_customer_email",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Sent,
    Skipped(SkipReason),
    ClaimedElsewhere,
    RetryScheduled,
    DeadLettered,
    Error,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Sent => "sent",
            Outcome::Skipped(_) => "skipped",
            Outcome::ClaimedElsewhere => "claimed_elsewhere",
            Outcome::RetryScheduled => "retry_scheduled",
            Outcome::DeadLettered => "dead_lettered",
            Outcome::Error => "error",
        }
    }
}

/// Recipient address for a reminder that is ready to send.
pub fn check_eligibility(due: &DueReminder, now: DateTime<Utc>) -> Result<String, SkipReason> {
    if due.reminder.scheduled_date > now {
        return Err(SkipReason::NotYetDue);
    }
    if due.invoice.is_none() {
        return Err(SkipReason::InvoiceMissing);
    }
    due.customer
        .as_ref()
        .and_then(|c| c.email.as_deref())
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .map(str::to_string)
        .ok_or(SkipReason::NoCustomerEmail)
}

pub fn reminder_subject(invoice_id: Uuid) -> String {
    format!("Payment reminder for invoice {}", invoice_id)
}

pub struct ReminderDispatcher {
    store: Arc<dyn InvoiceStore>,
    transport: Arc<dyn EmailTransport>,
    clock: Arc<dyn Clock>,
    settings: DispatcherSettings,
}

impl ReminderDispatcher {
    pub fn new(
        store: Arc<dyn InvoiceStore>,
        transport: Arc<dyn EmailTransport>,
        clock: Arc<dyn Clock>,
        settings: DispatcherSettings,
    ) -> Self {
        if settings.effective_claim_ttl() > settings.claim_ttl {
            warn!(
                claim_ttl_secs = settings.claim_ttl.as_secs(),
                send_timeout_secs = settings.send_timeout.as_secs(),
                "Claim TTL is shorter than the send timeout allows, raising it"
            );
        }
        Self {
            store,
            transport,
            clock,
            settings,
        }
    }

    /// Send every due reminder.
    ///
    /// Errors only when the run cannot start (stale-claim recovery or the
    /// initial listing failed). Per-reminder failures are counted in the
    /// summary.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<DispatchSummary, InvoicingError> {
        let start = Instant::now();
        let result = self.run_inner().await;
        let label = if result.is_ok() { "ok" } else { "error" };
        DISPATCH_RUN_DURATION
            .with_label_values(&[label])
            .observe(start.elapsed().as_secs_f64());

        let summary = result.inspect_err(|e| {
            ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
            error!(error = %e, "Reminder dispatch run failed");
        })?;

        info!(
            released_stale = summary.released_stale,
            examined = summary.examined,
            sent = summary.sent,
            skipped = summary.skipped,
            claimed_elsewhere = summary.claimed_elsewhere,
            retry_scheduled = summary.retry_scheduled,
            dead_lettered = summary.dead_lettered,
            errors = summary.errors,
            "Reminder dispatch run completed"
        );

        Ok(summary)
    }

    async fn run_inner(&self) -> Result<DispatchSummary, InvoicingError> {
        let mut summary = DispatchSummary::default();

        let claim_ttl = chrono::Duration::from_std(self.settings.effective_claim_ttl())
            .map_err(|_| InvoicingError::validation("Claim TTL is out of range"))?;
        summary.released_stale = self
            .store
            .release_stale_claims(self.clock.now() - claim_ttl)
            .await?;
        if summary.released_stale > 0 {
            warn!(
                released = summary.released_stale,
                "Released stale reminder claims"
            );
        }

        let due = self
            .store
            .list_reminders_by_status(ReminderStatus::Scheduled)
            .await?;

        let outcomes: Vec<Outcome> = stream::iter(due)
            .map(|item| self.process(item))
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            summary.examined += 1;
            REMINDER_DISPATCH_TOTAL
                .with_label_values(&[outcome.as_str()])
                .inc();
            match outcome {
                Outcome::Sent => summary.sent += 1,
                Outcome::Skipped(_) => summary.skipped += 1,
                Outcome::ClaimedElsewhere => summary.claimed_elsewhere += 1,
                Outcome::RetryScheduled => summary.retry_scheduled += 1,
                Outcome::DeadLettered => summary.dead_lettered += 1,
                Outcome::Error => summary.errors += 1,
            }
        }

        Ok(summary)
    }

    #[instrument(skip(self, due), fields(reminder_id = %due.reminder.reminder_id, invoice_id = %due.reminder.invoice_id))]
    async fn process(&self, due: DueReminder) -> Outcome {
        let now = self.clock.now();
        let recipient = match check_eligibility(&due, now) {
            Ok(recipient) => recipient,
            Err(reason) => {
                debug!(reason = reason.as_str(), "Reminder skipped");
                return Outcome::Skipped(reason);
            }
        };

        let reminder_id = due.reminder.reminder_id;
        match self.store.claim_reminder(reminder_id, now).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Reminder already claimed by another run");
                return Outcome::ClaimedElsewhere;
            }
            Err(e) => {
                ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
                error!(error = %e, "Failed to claim reminder");
                return Outcome::Error;
            }
        }

        let message = EmailMessage {
            to: recipient,
            subject: reminder_subject(due.reminder.invoice_id),
            html_body: due.reminder.email_template,
            attachments: Vec::new(),
        };

        let timeout = self.settings.send_timeout;
        let result = match tokio::time::timeout(timeout, self.transport.send(&message)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        };

        match result {
            Ok(receipt) => self.record_sent(reminder_id, &receipt.id).await,
            Err(e) => self.record_failure(reminder_id, e).await,
        }
    }

    async fn record_sent(&self, reminder_id: Uuid, receipt_id: &str) -> Outcome {
        match self
            .store
            .mark_reminder_sent(reminder_id, self.clock.now())
            .await
        {
            Ok(true) => {
                info!(receipt_id = %receipt_id, "Reminder sent");
                Outcome::Sent
            }
            Ok(false) => {
                // Claim was released as stale while the send was in flight.
                warn!(receipt_id = %receipt_id, "Reminder sent but claim was lost");
                Outcome::Error
            }
            Err(e) => {
                ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
                error!(error = %e, receipt_id = %receipt_id, "Failed to mark reminder sent");
                Outcome::Error
            }
        }
    }

    async fn record_failure(&self, reminder_id: Uuid, failure: TransportError) -> Outcome {
        let retryable = failure.is_retryable();
        let max_attempts = if retryable {
            self.settings.max_attempts
        } else {
            0
        };
        warn!(error = %failure, retryable = retryable, "Reminder send failed");
        ERRORS_TOTAL.with_label_values(&["transport_error"]).inc();

        match self
            .store
            .record_send_failure(reminder_id, &failure.to_string(), max_attempts)
            .await
        {
            Ok(Some(ReminderStatus::Failed)) => {
                let reason = if retryable {
                    "max_attempts"
                } else {
                    "permanent"
                };
                REMINDERS_DEAD_LETTERED_TOTAL
                    .with_label_values(&[reason])
                    .inc();
                error!(reason = reason, "Reminder dead-lettered");
                Outcome::DeadLettered
            }
            Ok(Some(_)) => Outcome::RetryScheduled,
            Ok(None) => {
                warn!("Reminder failure not recorded, claim was lost");
                Outcome::Error
            }
            Err(e) => {
                ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
                error!(error = %e, "Failed to record reminder send failure");
                Outcome::Error
            }
        }
    }
}
