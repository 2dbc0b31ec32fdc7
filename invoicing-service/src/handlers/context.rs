//! Caller context supplied by the gateway.

use crate::models::RequestContext;
use axum::extract::FromRequestParts;
use axum::http::{request::Parts, HeaderMap};
use service_core::error::AppError;
use uuid::Uuid;

pub const ORGANIZATION_HEADER: &str = "x-organization-id";
pub const ACTOR_HEADER: &str = "x-actor-id";

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let organization_id = uuid_header(&parts.headers, ORGANIZATION_HEADER)?;
        let actor_id = uuid_header(&parts.headers, ACTOR_HEADER)?;
        Ok(RequestContext::new(organization_id, actor_id))
    }
}

fn uuid_header(headers: &HeaderMap, name: &str) -> Result<Uuid, AppError> {
    let raw = headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing {} header", name)))?;

    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid {} header", name)))
}
