//! Persistence seam for invoicing-service.

use crate::error::InvoicingError;
use crate::models::{
    Customer, DueReminder, EmailReminder, Invoice, InvoiceStatus, InvoiceTotals, LineItem,
    NewCustomer, NewInvoice, NewReminder, ReminderStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Storage for customers, invoices and reminders.
///
/// Reads and writes driven by a caller are scoped by organization; a row in
/// another organization behaves as if it did not exist. The reminder
/// lifecycle operations used by the dispatcher run unscoped.
///
/// Conditional updates (`claim_reminder`, `cancel_reminder`, ...) must be
/// atomic: of two concurrent callers at most one observes success.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn health_check(&self) -> Result<(), InvoicingError>;

    async fn create_customer(&self, input: &NewCustomer) -> Result<Customer, InvoicingError>;

    async fn get_customer(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Option<Customer>, InvoicingError>;

    /// Delete a customer together with its invoices and their reminders.
    async fn delete_customer(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
    ) -> Result<bool, InvoicingError>;

    async fn create_invoice(&self, input: &NewInvoice) -> Result<Invoice, InvoicingError>;

    async fn get_invoice(
        &self,
        organization_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, InvoicingError>;

    /// Replace line items, tax rate and the derived totals in one write.
    async fn update_line_items(
        &self,
        organization_id: Uuid,
        invoice_id: Uuid,
        line_items: &[LineItem],
        tax_rate: Option<Decimal>,
        totals: InvoiceTotals,
    ) -> Result<Option<Invoice>, InvoicingError>;

    /// Move the invoice from `expected` to `status`. Returns `None` when the
    /// invoice is absent or no longer in `expected`. `payment_date: None`
    /// keeps the stored payment date.
    async fn update_invoice_status(
        &self,
        organization_id: Uuid,
        invoice_id: Uuid,
        expected: InvoiceStatus,
        status: InvoiceStatus,
        payment_date: Option<DateTime<Utc>>,
    ) -> Result<Option<Invoice>, InvoicingError>;

    async fn create_reminder(&self, input: &NewReminder) -> Result<EmailReminder, InvoicingError>;

    async fn get_reminder(
        &self,
        organization_id: Uuid,
        reminder_id: Uuid,
    ) -> Result<Option<EmailReminder>, InvoicingError>;

    async fn list_reminders_for_invoice(
        &self,
        organization_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<EmailReminder>, InvoicingError>;

    /// All reminders in `status`, joined with their invoice and customer.
    async fn list_reminders_by_status(
        &self,
        status: ReminderStatus,
    ) -> Result<Vec<DueReminder>, InvoicingError>;

    /// Move a reminder from `scheduled` to `sending`. `false` when it was not
    /// `scheduled` any more.
    async fn claim_reminder(
        &self,
        reminder_id: Uuid,
        claimed_at: DateTime<Utc>,
    ) -> Result<bool, InvoicingError>;

    /// Move a claimed reminder to `sent` and stamp the invoice's
    /// `last_reminded_utc`.
    async fn mark_reminder_sent(
        &self,
        reminder_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, InvoicingError>;

    /// Count a failed attempt on a claimed reminder. It returns to
    /// `scheduled`, or becomes `failed` once `attempts` reaches
    /// `max_attempts`; a `max_attempts` of 0 fails it outright. Returns the
    /// resulting status, `None` when the reminder was not claimed.
    async fn record_send_failure(
        &self,
        reminder_id: Uuid,
        error: &str,
        max_attempts: u32,
    ) -> Result<Option<ReminderStatus>, InvoicingError>;

    /// Return reminders claimed before `claimed_before` to `scheduled`.
    async fn release_stale_claims(
        &self,
        claimed_before: DateTime<Utc>,
    ) -> Result<u64, InvoicingError>;

    /// Cancel a reminder that is still `scheduled`. `None` when the reminder
    /// is in another state.
    async fn cancel_reminder(
        &self,
        organization_id: Uuid,
        reminder_id: Uuid,
    ) -> Result<Option<EmailReminder>, InvoicingError>;
}
