use crate::services::get_metrics;
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Health check endpoint for Docker/K8s liveness probes.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": state.config.service_name,
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "service": state.config.service_name,
                "error": e.to_string()
            })),
        ),
    }
}

/// Readiness check endpoint for K8s readiness probes.
///
/// Ready once the store answers and, when email is enabled, the transport
/// can reach its relay.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if let Err(e) = state.store.health_check().await {
        tracing::warn!(error = %e, "Readiness check failed: store unavailable");
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    if state.transport.is_enabled() {
        if let Err(e) = state.transport.health_check().await {
            tracing::warn!(error = %e, "Readiness check failed: email transport unavailable");
            return StatusCode::SERVICE_UNAVAILABLE;
        }
    }

    StatusCode::OK
}

pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}
