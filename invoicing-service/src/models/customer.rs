//! Customer model for invoicing-service.
//!
//! Customers are owned by the organization directory; this service keeps only
//! what invoices and reminders need.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Invoice recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Input for registering a customer.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub organization_id: Uuid,
    pub name: String,
    pub email: Option<String>,
}
