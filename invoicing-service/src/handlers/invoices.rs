use crate::models::{
    CreateInvoice, DisplayStatus, Invoice, InvoiceStatus, LineItem, PaymentTerms, RequestContext,
};
use crate::services::InvoiceView;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    pub customer_id: Uuid,
    #[validate(length(min = 1, message = "At least one line item is required"))]
    pub line_items: Vec<LineItem>,
    pub tax_rate: Option<Decimal>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub payment_terms: PaymentTerms,
    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReplaceLineItemsRequest {
    #[validate(length(min = 1, message = "At least one line item is required"))]
    pub line_items: Vec<LineItem>,
    pub tax_rate: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: InvoiceStatus,
}

/// Invoice as returned to clients: stored fields plus the derived status.
#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub display_status: DisplayStatus,
}

impl From<InvoiceView> for InvoiceResponse {
    fn from(view: InvoiceView) -> Self {
        Self {
            invoice: view.invoice,
            display_status: view.display_status,
        }
    }
}

/// Wrap a freshly written invoice with today's display status.
pub(crate) fn invoice_response(state: &AppState, invoice: Invoice) -> InvoiceResponse {
    let display_status = invoice.display_status(state.clock.today());
    InvoiceResponse {
        invoice,
        display_status,
    }
}

#[tracing::instrument(skip(state, request), fields(organization_id = %ctx.organization_id))]
pub async fn create_invoice(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), AppError> {
    request.validate()?;

    let invoice = state
        .invoices
        .create_invoice(
            &ctx,
            CreateInvoice {
                customer_id: request.customer_id,
                line_items: request.line_items,
                tax_rate: request.tax_rate,
                issue_date: request.issue_date,
                due_date: request.due_date,
                payment_terms: request.payment_terms,
                notes: request.notes,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(invoice_response(&state, invoice))))
}

#[tracing::instrument(skip(state), fields(organization_id = %ctx.organization_id))]
pub async fn get_invoice(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let view = state.invoices.get_invoice(&ctx, invoice_id).await?;
    Ok(Json(view.into()))
}

#[tracing::instrument(skip(state, request), fields(organization_id = %ctx.organization_id))]
pub async fn replace_line_items(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<ReplaceLineItemsRequest>,
) -> Result<Json<InvoiceResponse>, AppError> {
    request.validate()?;

    let invoice = state
        .invoices
        .replace_line_items(&ctx, invoice_id, request.line_items, request.tax_rate)
        .await?;

    Ok(Json(invoice_response(&state, invoice)))
}

#[tracing::instrument(skip(state, request), fields(organization_id = %ctx.organization_id))]
pub async fn update_status(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let invoice = state
        .invoices
        .update_status(&ctx, invoice_id, request.status)
        .await?;

    Ok(Json(invoice_response(&state, invoice)))
}
