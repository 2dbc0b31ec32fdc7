//! Authorization seam for invoicing-service.
//!
//! Membership and role resolution live outside this service. The gateway
//! resolves the caller into a `RequestContext`; an `Authorizer` decides
//! whether that caller may exercise a capability on an organization's data.

use crate::error::InvoicingError;
use crate::models::RequestContext;
use async_trait::async_trait;
use uuid::Uuid;

/// Invoicing service capabilities.
pub mod capabilities {
    /// Create invoices.
    pub const INVOICE_CREATE: &str = "invoicing.invoice:create";

    /// Read invoices.
    pub const INVOICE_READ: &str = "invoicing.invoice:read";

    /// Update invoice line items and status.
    pub const INVOICE_UPDATE: &str = "invoicing.invoice:update";

    /// Mark invoices paid from a payment confirmation.
    pub const PAYMENT_CONFIRM: &str = "invoicing.payment:confirm";

    /// Schedule reminders.
    pub const REMINDER_CREATE: &str = "invoicing.reminder:create";

    /// Read reminders.
    pub const REMINDER_READ: &str = "invoicing.reminder:read";

    /// Cancel reminders.
    pub const REMINDER_CANCEL: &str = "invoicing.reminder:cancel";
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(
        &self,
        ctx: &RequestContext,
        organization_id: Uuid,
        capability: &str,
    ) -> Result<(), InvoicingError>;
}

/// Trusts the gateway's membership check and enforces tenant isolation:
/// callers may only touch resources of the organization they act for.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrganizationScopeAuthorizer;

#[async_trait]
impl Authorizer for OrganizationScopeAuthorizer {
    async fn authorize(
        &self,
        ctx: &RequestContext,
        organization_id: Uuid,
        capability: &str,
    ) -> Result<(), InvoicingError> {
        if ctx.organization_id != organization_id {
            tracing::warn!(
                actor_id = %ctx.actor_id,
                caller_organization_id = %ctx.organization_id,
                organization_id = %organization_id,
                capability = capability,
                "Cross-organization access denied"
            );
            return Err(InvoicingError::Forbidden(format!(
                "Not permitted to perform {} for this organization",
                capability
            )));
        }
        Ok(())
    }
}
