//! Caller context passed explicitly into every core operation.

use uuid::Uuid;

/// Who is acting, and on behalf of which organization.
///
/// Resolved by the gateway from the session; the core never looks up the
/// current user or organization on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub organization_id: Uuid,
    pub actor_id: Uuid,
}

impl RequestContext {
    pub fn new(organization_id: Uuid, actor_id: Uuid) -> Self {
        Self {
            organization_id,
            actor_id,
        }
    }

    /// Context for machine-initiated actions such as payment webhooks.
    pub fn system(organization_id: Uuid) -> Self {
        Self {
            organization_id,
            actor_id: Uuid::nil(),
        }
    }
}
