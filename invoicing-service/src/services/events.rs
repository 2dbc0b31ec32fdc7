//! Change notifications for views that cache invoice data.

use crate::models::Invoice;
use async_trait::async_trait;

/// Notified after an invoice change has been persisted.
#[async_trait]
pub trait InvoiceChangeListener: Send + Sync {
    async fn invoice_changed(&self, invoice: &Invoice);
}

/// Default listener: records the invalidation in the trace.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingChangeListener;

#[async_trait]
impl InvoiceChangeListener for LoggingChangeListener {
    async fn invoice_changed(&self, invoice: &Invoice) {
        tracing::debug!(
            invoice_id = %invoice.invoice_id,
            organization_id = %invoice.organization_id,
            status = %invoice.status,
            "Invoice views invalidated"
        );
    }
}
