//! Invoice operations.

use crate::error::InvoicingError;
use crate::models::{
    CreateInvoice, DisplayStatus, Invoice, InvoiceStatus, LineItem, NewInvoice, RequestContext,
};
use crate::services::authz::{capabilities, Authorizer};
use crate::services::calculator::LineItemCalculator;
use crate::services::clock::Clock;
use crate::services::events::InvoiceChangeListener;
use crate::services::metrics::{
    ERRORS_TOTAL, INVOICES_CREATED_TOTAL, INVOICE_AMOUNT_TOTAL, STATUS_TRANSITIONS_TOTAL,
};
use crate::services::status::InvoiceStatusMachine;
use crate::services::store::InvoiceStore;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Writes of a status change that may race with another writer before the
/// caller gets a conflict.
const MAX_STATUS_WRITE_ATTEMPTS: u32 = 3;

/// An invoice together with the status to show for it today.
#[derive(Debug, Clone)]
pub struct InvoiceView {
    pub invoice: Invoice,
    pub display_status: DisplayStatus,
}

pub struct InvoiceService {
    store: Arc<dyn InvoiceStore>,
    authorizer: Arc<dyn Authorizer>,
    clock: Arc<dyn Clock>,
    listener: Arc<dyn InvoiceChangeListener>,
    machine: InvoiceStatusMachine,
    currency: String,
}

impl InvoiceService {
    pub fn new(
        store: Arc<dyn InvoiceStore>,
        authorizer: Arc<dyn Authorizer>,
        clock: Arc<dyn Clock>,
        listener: Arc<dyn InvoiceChangeListener>,
        machine: InvoiceStatusMachine,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            store,
            authorizer,
            clock,
            listener,
            machine,
            currency: currency.into(),
        }
    }

    #[instrument(skip(self, input), fields(organization_id = %ctx.organization_id, customer_id = %input.customer_id))]
    pub async fn create_invoice(
        &self,
        ctx: &RequestContext,
        input: CreateInvoice,
    ) -> Result<Invoice, InvoicingError> {
        self.authorizer
            .authorize(ctx, ctx.organization_id, capabilities::INVOICE_CREATE)
            .await?;

        let totals = LineItemCalculator::calculate(&input.line_items, input.tax_rate)
            .inspect_err(record_error)?;

        let issue_date = input.issue_date.unwrap_or_else(|| self.clock.today());
        let due_date = input
            .due_date
            .ok_or_else(|| InvoicingError::validation("Due date is required"))?;
        if due_date < issue_date {
            return Err(InvoicingError::validation(
                "Due date must not be before the issue date",
            ));
        }

        self.store
            .get_customer(ctx.organization_id, input.customer_id)
            .await?
            .ok_or(InvoicingError::NotFound("Customer"))?;

        let invoice = self
            .store
            .create_invoice(&NewInvoice {
                organization_id: ctx.organization_id,
                customer_id: input.customer_id,
                line_items: input.line_items,
                totals,
                tax_rate: input.tax_rate,
                currency: self.currency.clone(),
                issue_date,
                due_date,
                payment_terms: input.payment_terms,
                status: InvoiceStatus::default(),
                notes: input.notes,
            })
            .await?;

        INVOICES_CREATED_TOTAL
            .with_label_values(&[invoice.status.as_str()])
            .inc();
        INVOICE_AMOUNT_TOTAL
            .with_label_values(&[&invoice.currency])
            .inc_by(invoice.total as f64);

        info!(
            invoice_id = %invoice.invoice_id,
            subtotal = invoice.subtotal,
            tax_amount = invoice.tax_amount,
            total = invoice.total,
            "Invoice created"
        );

        Ok(invoice)
    }

    #[instrument(skip(self), fields(organization_id = %ctx.organization_id, invoice_id = %invoice_id))]
    pub async fn get_invoice(
        &self,
        ctx: &RequestContext,
        invoice_id: Uuid,
    ) -> Result<InvoiceView, InvoicingError> {
        let invoice = self
            .load_authorized(ctx, invoice_id, capabilities::INVOICE_READ)
            .await?;
        let display_status = invoice.display_status(self.clock.today());
        Ok(InvoiceView {
            invoice,
            display_status,
        })
    }

    /// Replace the line items and tax rate, re-deriving every total.
    #[instrument(skip(self, line_items), fields(organization_id = %ctx.organization_id, invoice_id = %invoice_id))]
    pub async fn replace_line_items(
        &self,
        ctx: &RequestContext,
        invoice_id: Uuid,
        line_items: Vec<LineItem>,
        tax_rate: Option<Decimal>,
    ) -> Result<Invoice, InvoicingError> {
        let invoice = self
            .load_authorized(ctx, invoice_id, capabilities::INVOICE_UPDATE)
            .await?;

        if !self.machine.line_items_editable(invoice.status) {
            return Err(InvoicingError::validation(format!(
                "Line items of a {} invoice cannot be changed",
                invoice.status
            )));
        }

        let totals = LineItemCalculator::calculate(&line_items, tax_rate).inspect_err(record_error)?;

        let updated = self
            .store
            .update_line_items(
                invoice.organization_id,
                invoice.invoice_id,
                &line_items,
                tax_rate,
                totals,
            )
            .await?
            .ok_or(InvoicingError::NotFound("Invoice"))?;

        self.listener.invoice_changed(&updated).await;

        info!(total = updated.total, "Invoice line items replaced");

        Ok(updated)
    }

    #[instrument(skip(self), fields(organization_id = %ctx.organization_id, invoice_id = %invoice_id, status = %new_status))]
    pub async fn update_status(
        &self,
        ctx: &RequestContext,
        invoice_id: Uuid,
        new_status: InvoiceStatus,
    ) -> Result<Invoice, InvoicingError> {
        let invoice = self
            .load_authorized(ctx, invoice_id, capabilities::INVOICE_UPDATE)
            .await?;
        self.apply_status(invoice, new_status).await
    }

    /// Mark an invoice paid on behalf of the payment processor.
    #[instrument(skip(self), fields(organization_id = %organization_id, invoice_id = %invoice_id))]
    pub async fn confirm_payment(
        &self,
        organization_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Invoice, InvoicingError> {
        let ctx = RequestContext::system(organization_id);
        let invoice = self
            .load_authorized(&ctx, invoice_id, capabilities::PAYMENT_CONFIRM)
            .await?;
        self.apply_status(invoice, InvoiceStatus::Paid).await
    }

    /// Validate and persist a status change. The write only lands if the
    /// invoice is still in the status the check was made against; otherwise
    /// the check is repeated on the fresh invoice.
    async fn apply_status(
        &self,
        mut invoice: Invoice,
        new_status: InvoiceStatus,
    ) -> Result<Invoice, InvoicingError> {
        let mut attempt = 1;
        let (change, updated) = loop {
            let change = self
                .machine
                .transition(&invoice, new_status, self.clock.now())
                .inspect_err(record_error)?;

            if let Some(updated) = self
                .store
                .update_invoice_status(
                    invoice.organization_id,
                    invoice.invoice_id,
                    change.from,
                    change.to,
                    change.payment_date,
                )
                .await?
            {
                break (change, updated);
            }

            invoice = self
                .store
                .get_invoice(invoice.organization_id, invoice.invoice_id)
                .await?
                .ok_or(InvoicingError::NotFound("Invoice"))?;

            if attempt >= MAX_STATUS_WRITE_ATTEMPTS {
                let err = InvoicingError::InvalidTransition {
                    from: invoice.status,
                    to: new_status,
                };
                record_error(&err);
                return Err(err);
            }
            warn!(
                current = invoice.status.as_str(),
                "Invoice status changed concurrently, re-checking transition"
            );
            attempt += 1;
        };

        STATUS_TRANSITIONS_TOTAL
            .with_label_values(&[change.from.as_str(), change.to.as_str()])
            .inc();

        self.listener.invoice_changed(&updated).await;

        info!(
            from = change.from.as_str(),
            to = change.to.as_str(),
            "Invoice status changed"
        );

        Ok(updated)
    }

    async fn load_authorized(
        &self,
        ctx: &RequestContext,
        invoice_id: Uuid,
        capability: &str,
    ) -> Result<Invoice, InvoicingError> {
        let invoice = self
            .store
            .get_invoice(ctx.organization_id, invoice_id)
            .await?
            .ok_or(InvoicingError::NotFound("Invoice"))?;

        self.authorizer
            .authorize(ctx, invoice.organization_id, capability)
            .await?;

        Ok(invoice)
    }
}

fn record_error(e: &InvoicingError) {
    ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
}
