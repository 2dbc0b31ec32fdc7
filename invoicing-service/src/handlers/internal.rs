//! Machine-to-machine endpoints, authenticated with shared secrets.

use super::invoices::{invoice_response, InvoiceResponse};
use crate::startup::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use service_core::utils::{bearer_token, secrets_match};
use uuid::Uuid;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ProcessRemindersResponse {
    pub success: bool,
}

/// Cron trigger for the reminder dispatcher.
///
/// The body never carries details: callers only learn whether the run
/// happened.
#[tracing::instrument(skip(state, headers))]
pub async fn process_reminders(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (StatusCode, Json<ProcessRemindersResponse>) {
    let presented = bearer_token(&headers).unwrap_or_default();
    if !secrets_match(&state.config.reminders.cron_secret, presented) {
        tracing::warn!("Rejected reminder trigger with invalid secret");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ProcessRemindersResponse { success: false }),
        );
    }

    match state.dispatcher.run().await {
        Ok(_) => (
            StatusCode::OK,
            Json(ProcessRemindersResponse { success: true }),
        ),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ProcessRemindersResponse { success: false }),
        ),
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentConfirmedRequest {
    pub organization_id: Uuid,
    pub invoice_id: Uuid,
}

/// Payment processor webhook: the invoice has been paid in full.
#[tracing::instrument(skip(state, headers, request), fields(invoice_id = %request.invoice_id))]
pub async fn payment_confirmed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PaymentConfirmedRequest>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let presented = bearer_token(&headers).unwrap_or_default();
    if !secrets_match(&state.config.payment_webhook_secret, presented) {
        tracing::warn!("Rejected payment webhook with invalid secret");
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Invalid webhook credentials"
        )));
    }

    let invoice = state
        .invoices
        .confirm_payment(request.organization_id, request.invoice_id)
        .await?;

    Ok(Json(invoice_response(&state, invoice)))
}
