//! HTTP handlers for the REST API.
//!
//! Each submodule covers one route group and delegates to the service layer
//! and repository traits for the actual work.

use axum::{extract::State, http::Uri, Json};
use chrono::Utc;
use serde_json::Value;
use tracing::warn;

use super::dto::HealthResponse;
use super::error::{ApiError, AppError};
use super::state::AppState;
use crate::models::{AuditAction, NewAuditEvent, UserId};

pub mod admin;
pub mod analysis;
pub mod auth;
pub mod payment;
pub mod user;

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

// =============================================================================
// Health Check
// =============================================================================

/// GET /health
///
/// Health check endpoint to verify the service is running and database is accessible.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_status = match state.repository.health_check().await {
        Ok(true) => "connected".to_string(),
        Ok(false) => "disconnected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        database: db_status,
    })
}

/// Fallback for unmatched routes.
pub async fn not_found(uri: Uri) -> (axum::http::StatusCode, Json<Value>) {
    let mut body = serde_json::to_value(ApiError::new("NOT_FOUND", "Route not found"))
        .unwrap_or_default();
    body["path"] = Value::String(uri.path().to_string());
    (axum::http::StatusCode::NOT_FOUND, Json(body))
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Append an audit row. Failures are logged and otherwise ignored.
pub(crate) async fn record_audit(
    state: &AppState,
    action: AuditAction,
    user_id: Option<UserId>,
    details: Value,
) {
    if let Err(e) = state
        .repository
        .record_event(&NewAuditEvent::new(action, user_id, details))
        .await
    {
        warn!(action = %action, error = %e, "Failed to record audit event");
    }
}

/// Parse a numeric path segment, answering 400 with `message` otherwise.
pub(crate) fn parse_id<T: std::str::FromStr>(raw: &str, message: &str) -> Result<T, AppError> {
    raw.parse::<T>()
        .map_err(|_| AppError::BadRequest(message.to_string()))
}
