//! Error taxonomy for invoicing-service.

use crate::models::{InvoiceStatus, ReminderStatus};
use crate::services::email::TransportError;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvoicingError {
    /// Malformed input. Never retried automatically.
    #[error("{0}")]
    Validation(String),

    #[error("Reminder would be scheduled for {scheduled_date}, which is before {now}")]
    PastDate {
        scheduled_date: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Forbidden(String),

    #[error("Invoice cannot move from {from} to {to}")]
    InvalidTransition {
        from: InvoiceStatus,
        to: InvoiceStatus,
    },

    #[error("Reminder is {0} and can no longer be cancelled")]
    InvalidReminderState(ReminderStatus),

    #[error("Email transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Database error: {0}")]
    Database(anyhow::Error),
}

impl InvoicingError {
    pub fn validation(message: impl Into<String>) -> Self {
        InvoicingError::Validation(message.into())
    }

    /// Label used for the errors counter.
    pub fn kind(&self) -> &'static str {
        match self {
            InvoicingError::Validation(_) => "validation_error",
            InvoicingError::PastDate { .. } => "past_date",
            InvoicingError::NotFound(_) => "not_found",
            InvoicingError::Forbidden(_) => "forbidden",
            InvoicingError::InvalidTransition { .. } => "invalid_transition",
            InvoicingError::InvalidReminderState(_) => "invalid_reminder_state",
            InvoicingError::Transport(_) => "transport_error",
            InvoicingError::Database(_) => "db_error",
        }
    }
}

impl From<InvoicingError> for AppError {
    fn from(err: InvoicingError) -> Self {
        let message = err.to_string();
        match err {
            InvoicingError::Validation(_) | InvoicingError::PastDate { .. } => {
                AppError::Unprocessable(anyhow::anyhow!(message))
            }
            InvoicingError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(message)),
            InvoicingError::Forbidden(_) => AppError::Forbidden(anyhow::anyhow!(message)),
            InvoicingError::InvalidTransition { .. } | InvoicingError::InvalidReminderState(_) => {
                AppError::Conflict(anyhow::anyhow!(message))
            }
            InvoicingError::Transport(e) => AppError::BadGateway(e.to_string()),
            InvoicingError::Database(e) => {
                tracing::error!(error = %e, "Storage failure");
                AppError::DatabaseError(e)
            }
        }
    }
}
