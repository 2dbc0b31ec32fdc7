//! PostgreSQL `InvoiceStore` for invoicing-service.

use crate::error::InvoicingError;
use crate::models::{
    Customer, DueReminder, EmailReminder, Invoice, InvoiceStatus, InvoiceTotals, LineItem,
    NewCustomer, NewInvoice, NewReminder, ParseEnumError, ReminderStatus,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::InvoiceStore;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "invoicing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, InvoicingError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| db_error("Failed to connect", e))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), InvoicingError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| InvoicingError::Database(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn load_due_context(
        &self,
        reminders: Vec<EmailReminder>,
    ) -> Result<Vec<DueReminder>, InvoicingError> {
        let invoice_ids: Vec<Uuid> = reminders.iter().map(|r| r.invoice_id).collect();

        let invoices: HashMap<Uuid, Invoice> = sqlx::query_as::<_, InvoiceRow>(
            r#"
            SELECT invoice_id, organization_id, customer_id, line_items, subtotal, tax_amount, total,
                tax_rate, currency, issue_date, due_date, payment_terms, status, payment_date, notes,
                last_reminded_utc, created_utc, updated_utc
            FROM invoices
            WHERE invoice_id = ANY($1)
            "#,
        )
        .bind(&invoice_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load reminder invoices", e))?
        .into_iter()
        .map(|row| Invoice::try_from(row).map(|i| (i.invoice_id, i)))
        .collect::<Result<_, _>>()?;

        let customer_ids: Vec<Uuid> = invoices.values().map(|i| i.customer_id).collect();

        let customers: HashMap<Uuid, Customer> = sqlx::query_as::<_, CustomerRow>(
            r#"
            SELECT customer_id, organization_id, name, email, created_utc
            FROM customers
            WHERE customer_id = ANY($1)
            "#,
        )
        .bind(&customer_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load reminder customers", e))?
        .into_iter()
        .map(|row| (row.customer_id, Customer::from(row)))
        .collect();

        Ok(reminders
            .into_iter()
            .map(|reminder| {
                let invoice = invoices.get(&reminder.invoice_id).cloned();
                let customer = invoice
                    .as_ref()
                    .and_then(|i| customers.get(&i.customer_id))
                    .cloned();
                DueReminder {
                    reminder,
                    invoice,
                    customer,
                }
            })
            .collect())
    }
}

#[async_trait]
impl InvoiceStore for Database {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), InvoicingError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Health check failed", e))?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Customer Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(organization_id = %input.organization_id))]
    async fn create_customer(&self, input: &NewCustomer) -> Result<Customer, InvoicingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_customer"])
            .start_timer();

        let row = sqlx::query_as::<_, CustomerRow>(
            r#"
            INSERT INTO customers (customer_id, organization_id, name, email)
            VALUES ($1, $2, $3, $4)
            RETURNING customer_id, organization_id, name, email, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.organization_id)
        .bind(&input.name)
        .bind(&input.email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create customer", e))?;

        timer.observe_duration();

        info!(customer_id = %row.customer_id, "Customer created");

        Ok(row.into())
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, customer_id = %customer_id))]
    async fn get_customer(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Option<Customer>, InvoicingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_customer"])
            .start_timer();

        let row = sqlx::query_as::<_, CustomerRow>(
            r#"
            SELECT customer_id, organization_id, name, email, created_utc
            FROM customers
            WHERE organization_id = $1 AND customer_id = $2
            "#,
        )
        .bind(organization_id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get customer", e))?;

        timer.observe_duration();

        Ok(row.map(Customer::from))
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, customer_id = %customer_id))]
    async fn delete_customer(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
    ) -> Result<bool, InvoicingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_customer"])
            .start_timer();

        // Invoices and their reminders go with the customer via ON DELETE CASCADE.
        let result = sqlx::query(
            r#"
            DELETE FROM customers
            WHERE organization_id = $1 AND customer_id = $2
            "#,
        )
        .bind(organization_id)
        .bind(customer_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to delete customer", e))?;

        timer.observe_duration();

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(customer_id = %customer_id, "Customer deleted");
        }

        Ok(deleted)
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(organization_id = %input.organization_id, customer_id = %input.customer_id))]
    async fn create_invoice(&self, input: &NewInvoice) -> Result<Invoice, InvoicingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let row = sqlx::query_as::<_, InvoiceRow>(
            r#"
            INSERT INTO invoices (invoice_id, organization_id, customer_id, line_items, subtotal,
                tax_amount, total, tax_rate, currency, issue_date, due_date, payment_terms, status, notes)
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14
            WHERE EXISTS (
                SELECT 1 FROM customers WHERE customer_id = $3 AND organization_id = $2
            )
            RETURNING invoice_id, organization_id, customer_id, line_items, subtotal, tax_amount, total,
                tax_rate, currency, issue_date, due_date, payment_terms, status, payment_date, notes,
                last_reminded_utc, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.organization_id)
        .bind(input.customer_id)
        .bind(Json(&input.line_items))
        .bind(input.totals.subtotal)
        .bind(input.totals.tax_amount)
        .bind(input.totals.total)
        .bind(input.tax_rate)
        .bind(&input.currency)
        .bind(input.issue_date)
        .bind(input.due_date)
        .bind(input.payment_terms.as_str())
        .bind(input.status.as_str())
        .bind(&input.notes)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create invoice", e))?;

        timer.observe_duration();

        let invoice = Invoice::try_from(row.ok_or(InvoicingError::NotFound("Customer"))?)?;

        info!(
            invoice_id = %invoice.invoice_id,
            total = invoice.total,
            "Invoice created"
        );

        Ok(invoice)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, invoice_id = %invoice_id))]
    async fn get_invoice(
        &self,
        organization_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, InvoicingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let row = sqlx::query_as::<_, InvoiceRow>(
            r#"
            SELECT invoice_id, organization_id, customer_id, line_items, subtotal, tax_amount, total,
                tax_rate, currency, issue_date, due_date, payment_terms, status, payment_date, notes,
                last_reminded_utc, created_utc, updated_utc
            FROM invoices
            WHERE organization_id = $1 AND invoice_id = $2
            "#,
        )
        .bind(organization_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get invoice", e))?;

        timer.observe_duration();

        row.map(Invoice::try_from).transpose()
    }

    #[instrument(skip(self, line_items), fields(organization_id = %organization_id, invoice_id = %invoice_id))]
    async fn update_line_items(
        &self,
        organization_id: Uuid,
        invoice_id: Uuid,
        line_items: &[LineItem],
        tax_rate: Option<Decimal>,
        totals: InvoiceTotals,
    ) -> Result<Option<Invoice>, InvoicingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_line_items"])
            .start_timer();

        let row = sqlx::query_as::<_, InvoiceRow>(
            r#"
            UPDATE invoices
            SET line_items = $3,
                tax_rate = $4,
                subtotal = $5,
                tax_amount = $6,
                total = $7,
                updated_utc = NOW()
            WHERE organization_id = $1 AND invoice_id = $2
            RETURNING invoice_id, organization_id, customer_id, line_items, subtotal, tax_amount, total,
                tax_rate, currency, issue_date, due_date, payment_terms, status, payment_date, notes,
                last_reminded_utc, created_utc, updated_utc
            "#,
        )
        .bind(organization_id)
        .bind(invoice_id)
        .bind(Json(line_items))
        .bind(tax_rate)
        .bind(totals.subtotal)
        .bind(totals.tax_amount)
        .bind(totals.total)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update line items", e))?;

        timer.observe_duration();

        row.map(Invoice::try_from).transpose()
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, invoice_id = %invoice_id, status = %status))]
    async fn update_invoice_status(
        &self,
        organization_id: Uuid,
        invoice_id: Uuid,
        expected: InvoiceStatus,
        status: InvoiceStatus,
        payment_date: Option<DateTime<Utc>>,
    ) -> Result<Option<Invoice>, InvoicingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_invoice_status"])
            .start_timer();

        let row = sqlx::query_as::<_, InvoiceRow>(
            r#"
            UPDATE invoices
            SET status = $3,
                payment_date = COALESCE($4, payment_date),
                updated_utc = NOW()
            WHERE organization_id = $1 AND invoice_id = $2 AND status = $5
            RETURNING invoice_id, organization_id, customer_id, line_items, subtotal, tax_amount, total,
                tax_rate, currency, issue_date, due_date, payment_terms, status, payment_date, notes,
                last_reminded_utc, created_utc, updated_utc
            "#,
        )
        .bind(organization_id)
        .bind(invoice_id)
        .bind(status.as_str())
        .bind(payment_date)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update invoice status", e))?;

        timer.observe_duration();

        row.map(Invoice::try_from).transpose()
    }

    // -------------------------------------------------------------------------
    // Reminder Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(invoice_id = %input.invoice_id))]
    async fn create_reminder(&self, input: &NewReminder) -> Result<EmailReminder, InvoicingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_reminder"])
            .start_timer();

        let row = sqlx::query_as::<_, ReminderRow>(
            r#"
            INSERT INTO email_reminders (reminder_id, invoice_id, organization_id, reminder_type, days,
                email_template, scheduled_date, status, attempts)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'scheduled', 0)
            RETURNING reminder_id, invoice_id, organization_id, reminder_type, days, email_template,
                scheduled_date, status, attempts, last_error, claimed_utc, sent_date, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.invoice_id)
        .bind(input.organization_id)
        .bind(input.reminder_type.as_str())
        .bind(to_db_count(input.days)?)
        .bind(&input.email_template)
        .bind(input.scheduled_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                InvoicingError::NotFound("Invoice")
            }
            _ => db_error("Failed to create reminder", e),
        })?;

        timer.observe_duration();

        let reminder = EmailReminder::try_from(row)?;

        info!(
            reminder_id = %reminder.reminder_id,
            scheduled_date = %reminder.scheduled_date,
            "Reminder scheduled"
        );

        Ok(reminder)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, reminder_id = %reminder_id))]
    async fn get_reminder(
        &self,
        organization_id: Uuid,
        reminder_id: Uuid,
    ) -> Result<Option<EmailReminder>, InvoicingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_reminder"])
            .start_timer();

        let row = sqlx::query_as::<_, ReminderRow>(
            r#"
            SELECT reminder_id, invoice_id, organization_id, reminder_type, days, email_template,
                scheduled_date, status, attempts, last_error, claimed_utc, sent_date, created_utc
            FROM email_reminders
            WHERE organization_id = $1 AND reminder_id = $2
            "#,
        )
        .bind(organization_id)
        .bind(reminder_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get reminder", e))?;

        timer.observe_duration();

        row.map(EmailReminder::try_from).transpose()
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, invoice_id = %invoice_id))]
    async fn list_reminders_for_invoice(
        &self,
        organization_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<EmailReminder>, InvoicingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_reminders_for_invoice"])
            .start_timer();

        let rows = sqlx::query_as::<_, ReminderRow>(
            r#"
            SELECT reminder_id, invoice_id, organization_id, reminder_type, days, email_template,
                scheduled_date, status, attempts, last_error, claimed_utc, sent_date, created_utc
            FROM email_reminders
            WHERE organization_id = $1 AND invoice_id = $2
            ORDER BY scheduled_date, created_utc
            "#,
        )
        .bind(organization_id)
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list reminders", e))?;

        timer.observe_duration();

        rows.into_iter().map(EmailReminder::try_from).collect()
    }

    #[instrument(skip(self), fields(status = %status))]
    async fn list_reminders_by_status(
        &self,
        status: ReminderStatus,
    ) -> Result<Vec<DueReminder>, InvoicingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_reminders_by_status"])
            .start_timer();

        let rows = sqlx::query_as::<_, ReminderRow>(
            r#"
            SELECT reminder_id, invoice_id, organization_id, reminder_type, days, email_template,
                scheduled_date, status, attempts, last_error, claimed_utc, sent_date, created_utc
            FROM email_reminders
            WHERE status = $1
            ORDER BY scheduled_date
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list reminders by status", e))?;

        let reminders = rows
            .into_iter()
            .map(EmailReminder::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let due = self.load_due_context(reminders).await?;

        timer.observe_duration();

        Ok(due)
    }

    #[instrument(skip(self), fields(reminder_id = %reminder_id))]
    async fn claim_reminder(
        &self,
        reminder_id: Uuid,
        claimed_at: DateTime<Utc>,
    ) -> Result<bool, InvoicingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["claim_reminder"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE email_reminders
            SET status = 'sending',
                claimed_utc = $2
            WHERE reminder_id = $1 AND status = 'scheduled'
            "#,
        )
        .bind(reminder_id)
        .bind(claimed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to claim reminder", e))?;

        timer.observe_duration();

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(reminder_id = %reminder_id))]
    async fn mark_reminder_sent(
        &self,
        reminder_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, InvoicingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_reminder_sent"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let invoice_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE email_reminders
            SET status = 'sent',
                sent_date = $2,
                claimed_utc = NULL
            WHERE reminder_id = $1 AND status = 'sending'
            RETURNING invoice_id
            "#,
        )
        .bind(reminder_id)
        .bind(sent_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to mark reminder sent", e))?;

        let Some(invoice_id) = invoice_id else {
            tx.rollback()
                .await
                .map_err(|e| db_error("Failed to roll back", e))?;
            timer.observe_duration();
            return Ok(false);
        };

        sqlx::query(
            r#"
            UPDATE invoices
            SET last_reminded_utc = $2
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .bind(sent_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to stamp invoice reminder time", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit", e))?;

        timer.observe_duration();

        Ok(true)
    }

    #[instrument(skip(self, error), fields(reminder_id = %reminder_id))]
    async fn record_send_failure(
        &self,
        reminder_id: Uuid,
        error: &str,
        max_attempts: u32,
    ) -> Result<Option<ReminderStatus>, InvoicingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_send_failure"])
            .start_timer();

        let status: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE email_reminders
            SET attempts = attempts + 1,
                last_error = $2,
                claimed_utc = NULL,
                status = CASE WHEN attempts + 1 >= $3 THEN 'failed' ELSE 'scheduled' END
            WHERE reminder_id = $1 AND status = 'sending'
            RETURNING status
            "#,
        )
        .bind(reminder_id)
        .bind(error)
        .bind(to_db_count(max_attempts)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to record send failure", e))?;

        timer.observe_duration();

        status
            .map(|s| s.parse::<ReminderStatus>().map_err(corrupt_row))
            .transpose()
    }

    #[instrument(skip(self))]
    async fn release_stale_claims(
        &self,
        claimed_before: DateTime<Utc>,
    ) -> Result<u64, InvoicingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["release_stale_claims"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE email_reminders
            SET status = 'scheduled',
                claimed_utc = NULL
            WHERE status = 'sending' AND claimed_utc < $1
            "#,
        )
        .bind(claimed_before)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to release stale claims", e))?;

        timer.observe_duration();

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, reminder_id = %reminder_id))]
    async fn cancel_reminder(
        &self,
        organization_id: Uuid,
        reminder_id: Uuid,
    ) -> Result<Option<EmailReminder>, InvoicingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["cancel_reminder"])
            .start_timer();

        let row = sqlx::query_as::<_, ReminderRow>(
            r#"
            UPDATE email_reminders
            SET status = 'cancelled'
            WHERE organization_id = $1 AND reminder_id = $2 AND status = 'scheduled'
            RETURNING reminder_id, invoice_id, organization_id, reminder_type, days, email_template,
                scheduled_date, status, attempts, last_error, claimed_utc, sent_date, created_utc
            "#,
        )
        .bind(organization_id)
        .bind(reminder_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to cancel reminder", e))?;

        timer.observe_duration();

        row.map(EmailReminder::try_from).transpose()
    }
}

// -----------------------------------------------------------------------------
// Row mapping
// -----------------------------------------------------------------------------

#[derive(Debug, FromRow)]
struct CustomerRow {
    customer_id: Uuid,
    organization_id: Uuid,
    name: String,
    email: Option<String>,
    created_utc: DateTime<Utc>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            customer_id: row.customer_id,
            organization_id: row.organization_id,
            name: row.name,
            email: row.email,
            created_utc: row.created_utc,
        }
    }
}

#[derive(Debug, FromRow)]
struct InvoiceRow {
    invoice_id: Uuid,
    organization_id: Uuid,
    customer_id: Uuid,
    line_items: Json<Vec<LineItem>>,
    subtotal: i64,
    tax_amount: i64,
    total: i64,
    tax_rate: Option<Decimal>,
    currency: String,
    issue_date: NaiveDate,
    due_date: Option<NaiveDate>,
    payment_terms: String,
    status: String,
    payment_date: Option<DateTime<Utc>>,
    notes: Option<String>,
    last_reminded_utc: Option<DateTime<Utc>>,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = InvoicingError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        Ok(Invoice {
            invoice_id: row.invoice_id,
            organization_id: row.organization_id,
            customer_id: row.customer_id,
            line_items: row.line_items.0,
            subtotal: row.subtotal,
            tax_amount: row.tax_amount,
            total: row.total,
            tax_rate: row.tax_rate,
            currency: row.currency,
            issue_date: row.issue_date,
            due_date: row.due_date,
            payment_terms: row.payment_terms.parse().map_err(corrupt_row)?,
            status: row.status.parse().map_err(corrupt_row)?,
            payment_date: row.payment_date,
            notes: row.notes,
            last_reminded_utc: row.last_reminded_utc,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        })
    }
}

#[derive(Debug, FromRow)]
struct ReminderRow {
    reminder_id: Uuid,
    invoice_id: Uuid,
    organization_id: Uuid,
    reminder_type: String,
    days: i32,
    email_template: String,
    scheduled_date: DateTime<Utc>,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    claimed_utc: Option<DateTime<Utc>>,
    sent_date: Option<DateTime<Utc>>,
    created_utc: DateTime<Utc>,
}

impl TryFrom<ReminderRow> for EmailReminder {
    type Error = InvoicingError;

    fn try_from(row: ReminderRow) -> Result<Self, Self::Error> {
        Ok(EmailReminder {
            reminder_id: row.reminder_id,
            invoice_id: row.invoice_id,
            organization_id: row.organization_id,
            reminder_type: row.reminder_type.parse().map_err(corrupt_row)?,
            days: u32::try_from(row.days).map_err(|_| negative_count("days"))?,
            email_template: row.email_template,
            scheduled_date: row.scheduled_date,
            status: row.status.parse().map_err(corrupt_row)?,
            attempts: u32::try_from(row.attempts).map_err(|_| negative_count("attempts"))?,
            last_error: row.last_error,
            claimed_utc: row.claimed_utc,
            sent_date: row.sent_date,
            created_utc: row.created_utc,
        })
    }
}

fn db_error(context: &str, e: sqlx::Error) -> InvoicingError {
    InvoicingError::Database(anyhow::anyhow!("{}: {}", context, e))
}

fn corrupt_row(e: ParseEnumError) -> InvoicingError {
    InvoicingError::Database(anyhow::anyhow!("Corrupt row: {}", e))
}

fn negative_count(column: &str) -> InvoicingError {
    InvoicingError::Database(anyhow::anyhow!("Corrupt row: negative {}", column))
}

fn to_db_count(value: u32) -> Result<i32, InvoicingError> {
    i32::try_from(value)
        .map_err(|_| InvoicingError::validation(format!("{} is too large", value)))
}
