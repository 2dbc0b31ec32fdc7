//! Reminder scheduling.
//!
//! A reminder's fire time is derived once, from the invoice due date and the
//! reminder policy, and stored as an absolute UTC timestamp. Nothing is sent
//! here; the dispatcher picks the reminder up once it is due.

use crate::error::InvoicingError;
use crate::models::{EmailReminder, NewReminder, ReminderType, RequestContext};
use crate::services::authz::{capabilities, Authorizer};
use crate::services::clock::Clock;
use crate::services::metrics::{ERRORS_TOTAL, REMINDERS_SCHEDULED_TOTAL};
use crate::services::store::InvoiceStore;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Absolute fire time for a reminder policy.
///
/// `on_due` ignores `days`. The reminder fires at `send_time` UTC on the
/// target date.
pub fn compute_scheduled_date(
    due_date: NaiveDate,
    reminder_type: ReminderType,
    days: u32,
    send_time: NaiveTime,
) -> Result<DateTime<Utc>, InvoicingError> {
    let offset = Days::new(u64::from(days));
    let target = match reminder_type {
        ReminderType::BeforeDue => due_date.checked_sub_days(offset),
        ReminderType::OnDue => Some(due_date),
        ReminderType::AfterDue => due_date.checked_add_days(offset),
    }
    .ok_or_else(|| InvoicingError::validation("Reminder date is out of range"))?;

    Ok(target.and_time(send_time).and_utc())
}

pub struct ReminderScheduler {
    store: Arc<dyn InvoiceStore>,
    authorizer: Arc<dyn Authorizer>,
    clock: Arc<dyn Clock>,
    send_time: NaiveTime,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn InvoiceStore>,
        authorizer: Arc<dyn Authorizer>,
        clock: Arc<dyn Clock>,
        send_time: NaiveTime,
    ) -> Self {
        Self {
            store,
            authorizer,
            clock,
            send_time,
        }
    }

    /// Persist a `scheduled` reminder for an invoice.
    #[instrument(skip(self, email_template), fields(organization_id = %ctx.organization_id, invoice_id = %invoice_id))]
    pub async fn schedule(
        &self,
        ctx: &RequestContext,
        invoice_id: Uuid,
        reminder_type: ReminderType,
        days: u32,
        email_template: String,
    ) -> Result<EmailReminder, InvoicingError> {
        let invoice = self
            .store
            .get_invoice(ctx.organization_id, invoice_id)
            .await?
            .ok_or(InvoicingError::NotFound("Invoice"))?;

        self.authorizer
            .authorize(ctx, invoice.organization_id, capabilities::REMINDER_CREATE)
            .await?;

        let due_date = invoice
            .due_date
            .ok_or(InvoicingError::NotFound("Invoice due date"))?;

        let days = match reminder_type {
            ReminderType::OnDue => 0,
            _ => days,
        };
        let scheduled_date =
            compute_scheduled_date(due_date, reminder_type, days, self.send_time)?;

        let now = self.clock.now();
        if scheduled_date < now {
            ERRORS_TOTAL.with_label_values(&["past_date"]).inc();
            warn!(
                scheduled_date = %scheduled_date,
                now = %now,
                "Rejected reminder scheduled in the past"
            );
            return Err(InvoicingError::PastDate {
                scheduled_date,
                now,
            });
        }

        if email_template.trim().is_empty() {
            return Err(InvoicingError::validation("Email template must not be empty"));
        }

        let reminder = self
            .store
            .create_reminder(&NewReminder {
                invoice_id: invoice.invoice_id,
                organization_id: invoice.organization_id,
                reminder_type,
                days,
                email_template,
                scheduled_date,
            })
            .await?;

        REMINDERS_SCHEDULED_TOTAL
            .with_label_values(&[reminder_type.as_str()])
            .inc();

        info!(
            reminder_id = %reminder.reminder_id,
            reminder_type = reminder_type.as_str(),
            scheduled_date = %reminder.scheduled_date,
            "Reminder created"
        );

        Ok(reminder)
    }

    #[instrument(skip(self), fields(organization_id = %ctx.organization_id, invoice_id = %invoice_id))]
    pub async fn list_for_invoice(
        &self,
        ctx: &RequestContext,
        invoice_id: Uuid,
    ) -> Result<Vec<EmailReminder>, InvoicingError> {
        let invoice = self
            .store
            .get_invoice(ctx.organization_id, invoice_id)
            .await?
            .ok_or(InvoicingError::NotFound("Invoice"))?;

        self.authorizer
            .authorize(ctx, invoice.organization_id, capabilities::REMINDER_READ)
            .await?;

        self.store
            .list_reminders_for_invoice(invoice.organization_id, invoice.invoice_id)
            .await
    }

    /// Cancel a reminder that has not been picked up yet.
    #[instrument(skip(self), fields(organization_id = %ctx.organization_id, reminder_id = %reminder_id))]
    pub async fn cancel(
        &self,
        ctx: &RequestContext,
        reminder_id: Uuid,
    ) -> Result<EmailReminder, InvoicingError> {
        let reminder = self
            .store
            .get_reminder(ctx.organization_id, reminder_id)
            .await?
            .ok_or(InvoicingError::NotFound("Reminder"))?;

        self.authorizer
            .authorize(ctx, reminder.organization_id, capabilities::REMINDER_CANCEL)
            .await?;

        match self
            .store
            .cancel_reminder(reminder.organization_id, reminder_id)
            .await?
        {
            Some(cancelled) => {
                info!(reminder_id = %reminder_id, "Reminder cancelled");
                Ok(cancelled)
            }
            None => {
                // Re-read: the dispatcher may have claimed it in between.
                let current = self
                    .store
                    .get_reminder(reminder.organization_id, reminder_id)
                    .await?
                    .ok_or(InvoicingError::NotFound("Reminder"))?;
                Err(InvoicingError::InvalidReminderState(current.status))
            }
        }
    }
}
