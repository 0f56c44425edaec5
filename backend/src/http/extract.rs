//! Request extractors: bearer authentication, the admin gate and JSON bodies
//! that reject with the API's own error shape.

use axum::{
    extract::{FromRequest, FromRequestParts, Json, Request},
    http::{header, request::Parts},
};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::error::AppError;
use super::state::AppState;
use crate::models::User;
use crate::services::AuthError;

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}

async fn resolve_user(state: &AppState, token: &str) -> Result<User, AppError> {
    let user_id = state.tokens.verify(token)?;
    let user = state.repository.get_user(user_id).await.map_err(|e| {
        if e.is_not_found() {
            AppError::Unauthorized("User not found".to_string())
        } else {
            e.into()
        }
    })?;
    if !user.is_active {
        return Err(AuthError::AccountDisabled.into());
    }
    Ok(user)
}

/// An authenticated, active account.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("Access token required".to_string()))?;
        resolve_user(state, token).await.map(AuthUser)
    }
}

/// The caller's account when a valid token is present. Missing or bad
/// tokens yield `None` instead of rejecting.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<User>);

impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(MaybeAuthUser(None));
        };
        match resolve_user(state, token).await {
            Ok(user) => Ok(MaybeAuthUser(Some(user))),
            Err(e) => {
                debug!(error = ?e, "Ignoring unusable token on optional-auth route");
                Ok(MaybeAuthUser(None))
            }
        }
    }
}

/// An authenticated account with the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(AdminUser(user))
    }
}

/// `Json<T>` whose rejection is an [`AppError`].
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        Ok(JsonBody(value))
    }
}
