//! Invoice model for invoicing-service.

use super::{InvoiceTotals, LineItem, ParseEnumError};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Open,
    #[default]
    Pending,
    Paid,
    Void,
    Uncollectible,
    Canceled,
    Failed,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 7] = [
        InvoiceStatus::Open,
        InvoiceStatus::Pending,
        InvoiceStatus::Paid,
        InvoiceStatus::Void,
        InvoiceStatus::Uncollectible,
        InvoiceStatus::Canceled,
        InvoiceStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Open => "open",
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
            InvoiceStatus::Uncollectible => "uncollectible",
            InvoiceStatus::Canceled => "canceled",
            InvoiceStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvoiceStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("invoice status", s))
    }
}

/// Payment terms. Advisory only: they never compute the due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaymentTerms {
    #[serde(rename = "due_on_receipt")]
    DueOnReceipt,
    #[serde(rename = "net_15")]
    Net15,
    #[default]
    #[serde(rename = "net_30")]
    Net30,
    #[serde(rename = "net_60")]
    Net60,
}

impl PaymentTerms {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentTerms::DueOnReceipt => "due_on_receipt",
            PaymentTerms::Net15 => "net_15",
            PaymentTerms::Net30 => "net_30",
            PaymentTerms::Net60 => "net_60",
        }
    }
}

impl FromStr for PaymentTerms {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "due_on_receipt" => Ok(PaymentTerms::DueOnReceipt),
            "net_15" => Ok(PaymentTerms::Net15),
            "net_30" => Ok(PaymentTerms::Net30),
            "net_60" => Ok(PaymentTerms::Net60),
            other => Err(ParseEnumError::new("payment terms", other)),
        }
    }
}

/// Status as shown to users. `Overdue` is derived on read and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayStatus {
    Stored(InvoiceStatus),
    Overdue,
}

impl DisplayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayStatus::Stored(status) => status.as_str(),
            DisplayStatus::Overdue => "overdue",
        }
    }
}

impl Serialize for DisplayStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Invoice document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub organization_id: Uuid,
    pub customer_id: Uuid,
    pub line_items: Vec<LineItem>,
    pub subtotal: i64,
    pub tax_amount: i64,
    pub total: i64,
    pub tax_rate: Option<Decimal>,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub payment_terms: PaymentTerms,
    pub status: InvoiceStatus,
    pub payment_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub last_reminded_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Invoice {
    /// Past its due date and not yet paid.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        matches!(self.due_date, Some(due) if due < today) && self.status != InvoiceStatus::Paid
    }

    pub fn display_status(&self, today: NaiveDate) -> DisplayStatus {
        if self.is_overdue(today) {
            DisplayStatus::Overdue
        } else {
            DisplayStatus::Stored(self.status)
        }
    }
}

/// Input for creating an invoice, as submitted by a caller.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub customer_id: Uuid,
    pub line_items: Vec<LineItem>,
    pub tax_rate: Option<Decimal>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub payment_terms: PaymentTerms,
    pub notes: Option<String>,
}

/// Fully derived invoice ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub organization_id: Uuid,
    pub customer_id: Uuid,
    pub line_items: Vec<LineItem>,
    pub totals: InvoiceTotals,
    pub tax_rate: Option<Decimal>,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub payment_terms: PaymentTerms,
    pub status: InvoiceStatus,
    pub notes: Option<String>,
}
