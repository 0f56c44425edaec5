//! HTTP error handling and response types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::db::repository::RepositoryError;
use crate::llm::LlmError;
use crate::services::{AnalysisError, AuthError, BillingError, ValidationErrors};

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Always `false`; mirrors the `success: true` of normal responses.
    pub success: bool,
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub error: String,
    /// Field-level messages for validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            code: code.into(),
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = Some(details);
        self
    }
}

/// Application error type for HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Malformed request (bad id, unreadable body)
    BadRequest(String),
    /// Input failed validation
    Validation(ValidationErrors),
    /// Missing, invalid or expired credentials
    Unauthorized(String),
    /// Authenticated but not allowed
    Forbidden(String),
    /// Resource not found
    NotFound(String),
    /// Uniqueness violation
    Conflict(String),
    TooManyRequests(String),
    /// A dependency (LLM, Stripe, database) is unavailable
    ServiceUnavailable(String),
    /// Internal server error
    Internal(String),
    /// Repository error
    Repository(RepositoryError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Repository(e) => match e {
                RepositoryError::NotFound { .. } => StatusCode::NOT_FOUND,
                RepositoryError::Conflict { .. } => StatusCode::CONFLICT,
                RepositoryError::ValidationError { .. } => StatusCode::BAD_REQUEST,
                RepositoryError::ConnectionError { .. } | RepositoryError::TimeoutError { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn body(self) -> ApiError {
        match self {
            AppError::BadRequest(msg) => ApiError::new("BAD_REQUEST", msg),
            AppError::Validation(errors) => {
                ApiError::new("VALIDATION_ERROR", "Invalid data").with_details(errors.0)
            }
            AppError::Unauthorized(msg) => ApiError::new("UNAUTHORIZED", msg),
            AppError::Forbidden(msg) => ApiError::new("FORBIDDEN", msg),
            AppError::NotFound(msg) => ApiError::new("NOT_FOUND", msg),
            AppError::Conflict(msg) => ApiError::new("CONFLICT", msg),
            AppError::TooManyRequests(msg) => ApiError::new("RATE_LIMITED", msg),
            AppError::ServiceUnavailable(msg) => ApiError::new("SERVICE_UNAVAILABLE", msg),
            AppError::Internal(msg) => {
                error!(error = %msg, "Internal error");
                ApiError::new("INTERNAL_ERROR", "Internal server error")
            }
            AppError::Repository(e) => match e {
                RepositoryError::NotFound { message, .. } => ApiError::new("NOT_FOUND", message),
                RepositoryError::Conflict { message, .. } => ApiError::new("CONFLICT", message),
                RepositoryError::ValidationError { message, .. } => {
                    ApiError::new("BAD_REQUEST", message)
                }
                unavailable @ (RepositoryError::ConnectionError { .. }
                | RepositoryError::TimeoutError { .. }) => {
                    error!(error = %unavailable, "Database unavailable");
                    ApiError::new("SERVICE_UNAVAILABLE", "Database unavailable")
                }
                other => {
                    error!(error = %other, "Repository error");
                    ApiError::new("REPOSITORY_ERROR", "Database error")
                }
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(self.body())).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        AppError::Repository(err)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => AppError::Unauthorized(err.to_string()),
            AuthError::AccountDisabled => {
                AppError::Unauthorized("Account is disabled. Contact support.".to_string())
            }
            AuthError::TokenExpired => AppError::Unauthorized("Token has expired".to_string()),
            AuthError::InvalidToken(_) => AppError::Unauthorized("Invalid token".to_string()),
            AuthError::Hashing(msg) => AppError::Internal(msg),
        }
    }
}

impl From<LlmError> for AppError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::RateLimited(_) => AppError::TooManyRequests(
                "The analysis service is busy. Please retry in a moment.".to_string(),
            ),
            LlmError::NotConfigured { .. }
            | LlmError::Unauthorized(_)
            | LlmError::QuotaExceeded(_)
            | LlmError::Timeout { .. } => AppError::ServiceUnavailable(
                "The analysis service is temporarily unavailable.".to_string(),
            ),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Llm(e) => e.into(),
            AnalysisError::Repository(e) => e.into(),
        }
    }
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::NotConfigured => {
                AppError::ServiceUnavailable("Payments are not configured".to_string())
            }
            BillingError::UnknownPlan(_) => AppError::BadRequest("Invalid plan".to_string()),
            BillingError::InvalidSignature(_) | BillingError::MalformedEvent(_) => {
                AppError::BadRequest(format!("Webhook error: {}", err))
            }
            BillingError::Stripe { .. } | BillingError::Transport(_) => {
                AppError::Internal(err.to_string())
            }
            BillingError::Repository(e) => e.into(),
        }
    }
}
