//! Domain models for invoicing-service.

mod context;
mod customer;
mod invoice;
mod line_item;
mod reminder;

pub use context::RequestContext;
pub use customer::{Customer, NewCustomer};
pub use invoice::{
    CreateInvoice, DisplayStatus, Invoice, InvoiceStatus, NewInvoice, PaymentTerms,
};
pub use line_item::{InvoiceTotals, LineItem};
pub use reminder::{DueReminder, EmailReminder, NewReminder, ReminderStatus, ReminderType};

use thiserror::Error;

/// Returned when a stored or submitted enum value is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
