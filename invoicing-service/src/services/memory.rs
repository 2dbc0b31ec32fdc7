//! In-memory `InvoiceStore` for tests and local development.

use crate::error::InvoicingError;
use crate::models::{
    Customer, DueReminder, EmailReminder, Invoice, InvoiceStatus, InvoiceTotals, LineItem,
    NewCustomer, NewInvoice, NewReminder, ReminderStatus,
};
use crate::services::store::InvoiceStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    customers: HashMap<Uuid, Customer>,
    invoices: HashMap<Uuid, Invoice>,
    reminders: HashMap<Uuid, EmailReminder>,
}

/// All state sits behind one mutex, so every conditional update is a
/// compare-and-set.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvoiceStore for MemoryStore {
    async fn health_check(&self) -> Result<(), InvoicingError> {
        Ok(())
    }

    async fn create_customer(&self, input: &NewCustomer) -> Result<Customer, InvoicingError> {
        let customer = Customer {
            customer_id: Uuid::new_v4(),
            organization_id: input.organization_id,
            name: input.name.clone(),
            email: input.email.clone(),
            created_utc: Utc::now(),
        };
        let mut tables = self.tables.lock().await;
        tables.customers.insert(customer.customer_id, customer.clone());
        Ok(customer)
    }

    async fn get_customer(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Option<Customer>, InvoicingError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .customers
            .get(&customer_id)
            .filter(|c| c.organization_id == organization_id)
            .cloned())
    }

    async fn delete_customer(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
    ) -> Result<bool, InvoicingError> {
        let mut tables = self.tables.lock().await;
        let owned = tables
            .customers
            .get(&customer_id)
            .is_some_and(|c| c.organization_id == organization_id);
        if !owned {
            return Ok(false);
        }

        tables.customers.remove(&customer_id);
        let invoice_ids: Vec<Uuid> = tables
            .invoices
            .values()
            .filter(|i| i.customer_id == customer_id)
            .map(|i| i.invoice_id)
            .collect();
        for invoice_id in &invoice_ids {
            tables.invoices.remove(invoice_id);
        }
        tables
            .reminders
            .retain(|_, r| !invoice_ids.contains(&r.invoice_id));
        Ok(true)
    }

    async fn create_invoice(&self, input: &NewInvoice) -> Result<Invoice, InvoicingError> {
        let now = Utc::now();
        let invoice = Invoice {
            invoice_id: Uuid::new_v4(),
            organization_id: input.organization_id,
            customer_id: input.customer_id,
            line_items: input.line_items.clone(),
            subtotal: input.totals.subtotal,
            tax_amount: input.totals.tax_amount,
            total: input.totals.total,
            tax_rate: input.tax_rate,
            currency: input.currency.clone(),
            issue_date: input.issue_date,
            due_date: Some(input.due_date),
            payment_terms: input.payment_terms,
            status: input.status,
            payment_date: None,
            notes: input.notes.clone(),
            last_reminded_utc: None,
            created_utc: now,
            updated_utc: now,
        };

        let mut tables = self.tables.lock().await;
        let customer_known = tables
            .customers
            .get(&input.customer_id)
            .is_some_and(|c| c.organization_id == input.organization_id);
        if !customer_known {
            return Err(InvoicingError::NotFound("Customer"));
        }
        tables.invoices.insert(invoice.invoice_id, invoice.clone());
        Ok(invoice)
    }

    async fn get_invoice(
        &self,
        organization_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, InvoicingError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .invoices
            .get(&invoice_id)
            .filter(|i| i.organization_id == organization_id)
            .cloned())
    }

    async fn update_line_items(
        &self,
        organization_id: Uuid,
        invoice_id: Uuid,
        line_items: &[LineItem],
        tax_rate: Option<Decimal>,
        totals: InvoiceTotals,
    ) -> Result<Option<Invoice>, InvoicingError> {
        let mut tables = self.tables.lock().await;
        let Some(invoice) = tables
            .invoices
            .get_mut(&invoice_id)
            .filter(|i| i.organization_id == organization_id)
        else {
            return Ok(None);
        };

        invoice.line_items = line_items.to_vec();
        invoice.tax_rate = tax_rate;
        invoice.subtotal = totals.subtotal;
        invoice.tax_amount = totals.tax_amount;
        invoice.total = totals.total;
        invoice.updated_utc = Utc::now();
        Ok(Some(invoice.clone()))
    }

    async fn update_invoice_status(
        &self,
        organization_id: Uuid,
        invoice_id: Uuid,
        expected: InvoiceStatus,
        status: InvoiceStatus,
        payment_date: Option<DateTime<Utc>>,
    ) -> Result<Option<Invoice>, InvoicingError> {
        let mut tables = self.tables.lock().await;
        let Some(invoice) = tables
            .invoices
            .get_mut(&invoice_id)
            .filter(|i| i.organization_id == organization_id && i.status == expected)
        else {
            return Ok(None);
        };

        invoice.status = status;
        if payment_date.is_some() {
            invoice.payment_date = payment_date;
        }
        invoice.updated_utc = Utc::now();
        Ok(Some(invoice.clone()))
    }

    async fn create_reminder(&self, input: &NewReminder) -> Result<EmailReminder, InvoicingError> {
        let reminder = EmailReminder {
            reminder_id: Uuid::new_v4(),
            invoice_id: input.invoice_id,
            organization_id: input.organization_id,
            reminder_type: input.reminder_type,
            days: input.days,
            email_template: input.email_template.clone(),
            scheduled_date: input.scheduled_date,
            status: ReminderStatus::Scheduled,
            attempts: 0,
            last_error: None,
            claimed_utc: None,
            sent_date: None,
            created_utc: Utc::now(),
        };

        let mut tables = self.tables.lock().await;
        if !tables.invoices.contains_key(&input.invoice_id) {
            return Err(InvoicingError::NotFound("Invoice"));
        }
        tables.reminders.insert(reminder.reminder_id, reminder.clone());
        Ok(reminder)
    }

    async fn get_reminder(
        &self,
        organization_id: Uuid,
        reminder_id: Uuid,
    ) -> Result<Option<EmailReminder>, InvoicingError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .reminders
            .get(&reminder_id)
            .filter(|r| r.organization_id == organization_id)
            .cloned())
    }

    async fn list_reminders_for_invoice(
        &self,
        organization_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<EmailReminder>, InvoicingError> {
        let tables = self.tables.lock().await;
        let mut reminders: Vec<EmailReminder> = tables
            .reminders
            .values()
            .filter(|r| r.organization_id == organization_id && r.invoice_id == invoice_id)
            .cloned()
            .collect();
        reminders.sort_by_key(|r| (r.scheduled_date, r.created_utc));
        Ok(reminders)
    }

    async fn list_reminders_by_status(
        &self,
        status: ReminderStatus,
    ) -> Result<Vec<DueReminder>, InvoicingError> {
        let tables = self.tables.lock().await;
        let mut due: Vec<DueReminder> = tables
            .reminders
            .values()
            .filter(|r| r.status == status)
            .map(|r| {
                let invoice = tables.invoices.get(&r.invoice_id).cloned();
                let customer = invoice
                    .as_ref()
                    .and_then(|i| tables.customers.get(&i.customer_id))
                    .cloned();
                DueReminder {
                    reminder: r.clone(),
                    invoice,
                    customer,
                }
            })
            .collect();
        due.sort_by_key(|d| d.reminder.scheduled_date);
        Ok(due)
    }

    async fn claim_reminder(
        &self,
        reminder_id: Uuid,
        claimed_at: DateTime<Utc>,
    ) -> Result<bool, InvoicingError> {
        let mut tables = self.tables.lock().await;
        match tables.reminders.get_mut(&reminder_id) {
            Some(reminder) if reminder.status == ReminderStatus::Scheduled => {
                reminder.status = ReminderStatus::Sending;
                reminder.claimed_utc = Some(claimed_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_reminder_sent(
        &self,
        reminder_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, InvoicingError> {
        let mut tables = self.tables.lock().await;
        let invoice_id = match tables.reminders.get_mut(&reminder_id) {
            Some(reminder) if reminder.status == ReminderStatus::Sending => {
                reminder.status = ReminderStatus::Sent;
                reminder.sent_date = Some(sent_at);
                reminder.claimed_utc = None;
                reminder.invoice_id
            }
            _ => return Ok(false),
        };
        if let Some(invoice) = tables.invoices.get_mut(&invoice_id) {
            invoice.last_reminded_utc = Some(sent_at);
        }
        Ok(true)
    }

    async fn record_send_failure(
        &self,
        reminder_id: Uuid,
        error: &str,
        max_attempts: u32,
    ) -> Result<Option<ReminderStatus>, InvoicingError> {
        let mut tables = self.tables.lock().await;
        match tables.reminders.get_mut(&reminder_id) {
            Some(reminder) if reminder.status == ReminderStatus::Sending => {
                reminder.attempts += 1;
                reminder.last_error = Some(error.to_string());
                reminder.claimed_utc = None;
                reminder.status = if reminder.attempts >= max_attempts {
                    ReminderStatus::Failed
                } else {
                    ReminderStatus::Scheduled
                };
                Ok(Some(reminder.status))
            }
            _ => Ok(None),
        }
    }

    async fn release_stale_claims(
        &self,
        claimed_before: DateTime<Utc>,
    ) -> Result<u64, InvoicingError> {
        let mut tables = self.tables.lock().await;
        let mut released = 0;
        for reminder in tables.reminders.values_mut() {
            let stale = reminder.status == ReminderStatus::Sending
                && reminder.claimed_utc.is_some_and(|at| at < claimed_before);
            if stale {
                reminder.status = ReminderStatus::Scheduled;
                reminder.claimed_utc = None;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn cancel_reminder(
        &self,
        organization_id: Uuid,
        reminder_id: Uuid,
    ) -> Result<Option<EmailReminder>, InvoicingError> {
        let mut tables = self.tables.lock().await;
        match tables.reminders.get_mut(&reminder_id) {
            Some(reminder)
                if reminder.organization_id == organization_id
                    && reminder.status == ReminderStatus::Scheduled =>
            {
                reminder.status = ReminderStatus::Cancelled;
                Ok(Some(reminder.clone()))
            }
            _ => Ok(None),
        }
    }
}
