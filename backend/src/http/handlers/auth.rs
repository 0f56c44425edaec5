//! `/api/auth/*`: registration, login, token verification and logout.

use axum::{extract::State, http::StatusCode, Json};
use serde_json::json;
use tracing::info;

use super::{record_audit, HandlerResult};
use crate::http::dto::{AuthResponse, LoginRequest, MessageResponse, RegisterRequest, UserDto, UserResponse};
use crate::http::error::AppError;
use crate::http::extract::{AuthUser, JsonBody};
use crate::http::state::AppState;
use crate::models::{AuditAction, NewUser, UserRole};
use crate::services::validation::{validate_login, validate_registration};
use crate::services::AuthError;

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let first_name = blank_to_none(body.first_name);
    let last_name = blank_to_none(body.last_name);
    validate_registration(
        &body.email,
        &body.password,
        first_name.as_deref(),
        last_name.as_deref(),
    )?;

    let email = body.email.trim().to_lowercase();
    if state.repository.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict(
            "An account with this email already exists".to_string(),
        ));
    }

    let password_hash = state.hasher.hash(&body.password).await?;
    let role = if state.config.is_admin_email(&email) {
        UserRole::Admin
    } else {
        UserRole::User
    };

    let user = state
        .repository
        .create_user(&NewUser {
            email,
            password_hash,
            first_name,
            last_name,
            role,
        })
        .await
        .map_err(|e| {
            if e.is_conflict() {
                AppError::Conflict("An account with this email already exists".to_string())
            } else {
                e.into()
            }
        })?;

    let token = state.tokens.issue(user.id)?;
    record_audit(
        &state,
        AuditAction::UserRegistered,
        Some(user.id),
        json!({ "email": user.email }),
    )
    .await;
    info!(user_id = %user.id, role = %user.role, "Account created");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            success: true,
            message: "Account created successfully".to_string(),
            user: UserDto::from(&user),
            token,
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<LoginRequest>,
) -> HandlerResult<AuthResponse> {
    validate_login(&body.email, &body.password)?;

    let email = body.email.trim().to_lowercase();
    let user = state
        .repository
        .find_user_by_email(&email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !state.hasher.verify(&body.password, &user.password_hash).await? {
        return Err(AuthError::InvalidCredentials.into());
    }
    if !user.is_active {
        return Err(AuthError::AccountDisabled.into());
    }

    let token = state.tokens.issue(user.id)?;
    record_audit(
        &state,
        AuditAction::UserLogin,
        Some(user.id),
        json!({ "email": user.email }),
    )
    .await;

    Ok(Json(AuthResponse {
        success: true,
        message: "Login successful".to_string(),
        user: UserDto::from(&user),
        token,
    }))
}

/// GET /api/auth/verify
pub async fn verify(AuthUser(user): AuthUser) -> Json<UserResponse> {
    Json(UserResponse {
        success: true,
        message: Some("Token is valid".to_string()),
        user: UserDto::from(&user),
    })
}

/// POST /api/auth/logout
///
/// Tokens are stateless; logging out only records the event.
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Json<MessageResponse> {
    record_audit(
        &state,
        AuditAction::UserLogout,
        Some(user.id),
        json!({ "email": user.email }),
    )
    .await;
    Json(MessageResponse::new("Logged out successfully"))
}
