//! Invoice status state machine.

use crate::error::InvoicingError;
use crate::models::{Invoice, InvoiceStatus, ParseEnumError};
use chrono::{DateTime, Utc};
use std::str::FromStr;

/// Which status changes are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Any status may move to any status, including itself.
    #[default]
    Permissive,
    /// Only the transitions in the lifecycle table are allowed.
    Strict,
}

impl TransitionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionPolicy::Permissive => "permissive",
            TransitionPolicy::Strict => "strict",
        }
    }
}

impl FromStr for TransitionPolicy {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "permissive" => Ok(TransitionPolicy::Permissive),
            "strict" => Ok(TransitionPolicy::Strict),
            _ => Err(ParseEnumError::new("transition policy", s)),
        }
    }
}

/// An accepted status change, ready to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: InvoiceStatus,
    pub to: InvoiceStatus,
    /// `Some` only when entering `paid`; otherwise the stored value is kept.
    pub payment_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InvoiceStatusMachine {
    policy: TransitionPolicy,
}

impl InvoiceStatusMachine {
    pub fn new(policy: TransitionPolicy) -> Self {
        Self { policy }
    }

    /// Statuses reachable from `from` under the strict lifecycle.
    pub fn allowed_targets(from: InvoiceStatus) -> &'static [InvoiceStatus] {
        use InvoiceStatus::*;
        match from {
            Pending => &[Open, Paid, Void, Canceled, Failed, Uncollectible],
            Open => &[Paid, Void, Canceled, Failed, Uncollectible],
            Failed => &[Open, Pending, Paid, Void, Canceled],
            Uncollectible => &[Paid, Void],
            Paid | Void | Canceled => &[],
        }
    }

    pub fn can_transition(&self, from: InvoiceStatus, to: InvoiceStatus) -> bool {
        match self.policy {
            TransitionPolicy::Permissive => true,
            TransitionPolicy::Strict => Self::allowed_targets(from).contains(&to),
        }
    }

    /// Whether line items may still be replaced. Under the strict policy a
    /// terminal invoice is frozen.
    pub fn line_items_editable(&self, status: InvoiceStatus) -> bool {
        match self.policy {
            TransitionPolicy::Permissive => true,
            TransitionPolicy::Strict => !Self::allowed_targets(status).is_empty(),
        }
    }

    /// Validate moving `invoice` to `to` at `now`.
    pub fn transition(
        &self,
        invoice: &Invoice,
        to: InvoiceStatus,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, InvoicingError> {
        let from = invoice.status;
        if !self.can_transition(from, to) {
            return Err(InvoicingError::InvalidTransition { from, to });
        }

        let payment_date = (to == InvoiceStatus::Paid).then_some(now);

        Ok(StatusChange {
            from,
            to,
            payment_date,
        })
    }
}

/// Client-side view of a status change that has been shown before the
/// server confirmed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimisticStatus {
    current: InvoiceStatus,
    previous: Option<InvoiceStatus>,
}

impl OptimisticStatus {
    pub fn new(current: InvoiceStatus) -> Self {
        Self {
            current,
            previous: None,
        }
    }

    /// Show `next` immediately and remember what to restore on failure.
    pub fn apply(&mut self, next: InvoiceStatus) -> InvoiceStatus {
        if self.previous.is_none() {
            self.previous = Some(self.current);
        }
        self.current = next;
        self.current
    }

    pub fn is_pending(&self) -> bool {
        self.previous.is_some()
    }

    pub fn confirm(&mut self) -> InvoiceStatus {
        self.previous = None;
        self.current
    }

    pub fn rollback(&mut self) -> InvoiceStatus {
        if let Some(previous) = self.previous.take() {
            self.current = previous;
        }
        self.current
    }
}
