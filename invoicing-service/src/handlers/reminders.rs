use crate::models::{EmailReminder, ReminderType, RequestContext};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ScheduleReminderRequest {
    pub reminder_type: ReminderType,
    #[serde(default)]
    pub days: u32,
    #[validate(length(min = 1, message = "Email template cannot be empty"))]
    pub email_template: String,
}

#[tracing::instrument(skip(state, request), fields(organization_id = %ctx.organization_id))]
pub async fn schedule_reminder(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<ScheduleReminderRequest>,
) -> Result<(StatusCode, Json<EmailReminder>), AppError> {
    request.validate()?;

    let reminder = state
        .scheduler
        .schedule(
            &ctx,
            invoice_id,
            request.reminder_type,
            request.days,
            request.email_template,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(reminder)))
}

#[tracing::instrument(skip(state), fields(organization_id = %ctx.organization_id))]
pub async fn list_reminders(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Vec<EmailReminder>>, AppError> {
    let reminders = state.scheduler.list_for_invoice(&ctx, invoice_id).await?;
    Ok(Json(reminders))
}

#[tracing::instrument(skip(state), fields(organization_id = %ctx.organization_id))]
pub async fn cancel_reminder(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(reminder_id): Path<Uuid>,
) -> Result<Json<EmailReminder>, AppError> {
    let reminder = state.scheduler.cancel(&ctx, reminder_id).await?;
    Ok(Json(reminder))
}
