//! Line item model for invoicing-service.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One billable entry on an invoice. Amounts are in major units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
}

impl LineItem {
    pub fn new(description: impl Into<String>, quantity: Decimal, rate: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity,
            rate,
        }
    }
}

/// Monetary totals in minor currency units (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal: i64,
    pub tax_amount: i64,
    pub total: i64,
}
