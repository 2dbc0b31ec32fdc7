//! Email reminder model for invoicing-service.

use super::{Customer, Invoice, ParseEnumError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// When a reminder fires relative to the invoice due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderType {
    BeforeDue,
    OnDue,
    AfterDue,
}

impl ReminderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderType::BeforeDue => "before_due",
            ReminderType::OnDue => "on_due",
            ReminderType::AfterDue => "after_due",
        }
    }
}

impl FromStr for ReminderType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before_due" => Ok(ReminderType::BeforeDue),
            "on_due" => Ok(ReminderType::OnDue),
            "after_due" => Ok(ReminderType::AfterDue),
            other => Err(ParseEnumError::new("reminder type", other)),
        }
    }
}

/// Reminder delivery status.
///
/// `Sending` marks a reminder claimed by a dispatcher run; only the run that
/// performed the claim may send it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Scheduled,
    Sending,
    Sent,
    Failed,
    Cancelled,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Scheduled => "scheduled",
            ReminderStatus::Sending => "sending",
            ReminderStatus::Sent => "sent",
            ReminderStatus::Failed => "failed",
            ReminderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReminderStatus::Sent | ReminderStatus::Failed | ReminderStatus::Cancelled
        )
    }
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReminderStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(ReminderStatus::Scheduled),
            "sending" => Ok(ReminderStatus::Sending),
            "sent" => Ok(ReminderStatus::Sent),
            "failed" => Ok(ReminderStatus::Failed),
            "cancelled" => Ok(ReminderStatus::Cancelled),
            other => Err(ParseEnumError::new("reminder status", other)),
        }
    }
}

/// A payment reminder scheduled against one invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailReminder {
    pub reminder_id: Uuid,
    pub invoice_id: Uuid,
    pub organization_id: Uuid,
    pub reminder_type: ReminderType,
    pub days: u32,
    pub email_template: String,
    /// Fixed when the reminder is created; later due date edits do not move it.
    pub scheduled_date: DateTime<Utc>,
    pub status: ReminderStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub claimed_utc: Option<DateTime<Utc>>,
    pub sent_date: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

/// Input for persisting a reminder.
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub invoice_id: Uuid,
    pub organization_id: Uuid,
    pub reminder_type: ReminderType,
    pub days: u32,
    pub email_template: String,
    pub scheduled_date: DateTime<Utc>,
}

/// A reminder joined with its invoice and the invoice's customer.
#[derive(Debug, Clone)]
pub struct DueReminder {
    pub reminder: EmailReminder,
    pub invoice: Option<Invoice>,
    pub customer: Option<Customer>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(ReminderStatus::Sent.is_terminal());
        assert!(ReminderStatus::Failed.is_terminal());
        assert!(ReminderStatus::Cancelled.is_terminal());
        assert!(!ReminderStatus::Scheduled.is_terminal());
        assert!(!ReminderStatus::Sending.is_terminal());
    }

    #[test]
    fn reminder_type_parses_wire_names() {
        assert_eq!(
            "before_due".parse::<ReminderType>().unwrap(),
            ReminderType::BeforeDue
        );
        assert_eq!("on_due".parse::<ReminderType>().unwrap(), ReminderType::OnDue);
        assert!("someday".parse::<ReminderType>().is_err());
    }
}
