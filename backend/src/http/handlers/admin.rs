//! `/api/admin/*`: platform statistics, account management and audit logs.
//!
//! Every handler takes [`AdminUser`], so non-admins get 403 before any work
//! is done.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde_json::json;
use tracing::info;

use super::{parse_id, record_audit, HandlerResult};
use crate::db::models::{AnalysisFilter, UserFilter};
use crate::http::dto::{
    AdminAnalysesQuery, AdminAnalysesResponse, AdminLogsQuery, AdminLogsResponse,
    AdminStatsResponse, AdminUsersQuery, AdminUsersResponse, MessageResponse, UserStatusUpdate,
};
use crate::http::error::AppError;
use crate::http::extract::{AdminUser, JsonBody};
use crate::http::state::AppState;
use crate::models::{AnalysisType, AuditAction, UserId};
use crate::services::{Pagination, ValidationErrors};

/// GET /api/admin/stats
pub async fn stats(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> HandlerResult<AdminStatsResponse> {
    let stats = state.repository.platform_stats(Utc::now()).await?;
    Ok(Json(AdminStatsResponse {
        success: true,
        stats: stats.into(),
    }))
}

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<AdminUsersQuery>,
) -> HandlerResult<AdminUsersResponse> {
    let page = query.page_request();
    let filter = UserFilter {
        search: query.search().map(str::to_string),
    };
    let paged = state.repository.list_users(&filter, page).await?;

    Ok(Json(AdminUsersResponse {
        success: true,
        pagination: Pagination::new(page, paged.total),
        users: paged.items.into_iter().map(Into::into).collect(),
    }))
}

/// PATCH /api/admin/users/{id}/status
pub async fn update_user_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(raw_id): Path<String>,
    JsonBody(body): JsonBody<UserStatusUpdate>,
) -> HandlerResult<MessageResponse> {
    let target: UserId = parse_id(&raw_id, "Invalid user ID")?;
    let is_active = body.is_active.ok_or_else(|| {
        ValidationErrors(vec!["isActive must be a boolean".to_string()])
    })?;

    if target == admin.id {
        return Err(AppError::BadRequest(
            "You cannot change your own status".to_string(),
        ));
    }

    state
        .repository
        .set_user_active(target, is_active)
        .await
        .map_err(|e| {
            if e.is_not_found() {
                AppError::NotFound("User not found".to_string())
            } else {
                e.into()
            }
        })?;

    record_audit(
        &state,
        AuditAction::AdminUserStatusChanged,
        Some(admin.id),
        json!({ "targetUserId": target, "isActive": is_active }),
    )
    .await;
    info!(admin_id = %admin.id, target = %target, is_active, "Account status changed");

    let verb = if is_active { "activated" } else { "deactivated" };
    Ok(Json(MessageResponse::new(format!("User {} successfully", verb))))
}

/// GET /api/admin/analyses
pub async fn list_analyses(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<AdminAnalysesQuery>,
) -> HandlerResult<AdminAnalysesResponse> {
    let analysis_type = query
        .analysis_type()
        .map(|t| t.parse::<AnalysisType>().map_err(AppError::BadRequest))
        .transpose()?;
    let user_id = query
        .user_id()
        .map(|id| parse_id::<UserId>(id, "Invalid user ID"))
        .transpose()?;

    let page = query.page_request();
    let paged = state
        .repository
        .list_all_analyses(
            &AnalysisFilter {
                analysis_type,
                user_id,
            },
            page,
        )
        .await?;

    Ok(Json(AdminAnalysesResponse {
        success: true,
        pagination: Pagination::new(page, paged.total),
        analyses: paged.items.into_iter().map(Into::into).collect(),
    }))
}

/// GET /api/admin/logs
pub async fn list_logs(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<AdminLogsQuery>,
) -> HandlerResult<AdminLogsResponse> {
    let page = query.page_request();
    let paged = state.repository.list_events(query.action(), page).await?;

    Ok(Json(AdminLogsResponse {
        success: true,
        pagination: Pagination::new(page, paged.total),
        logs: paged.items.into_iter().map(Into::into).collect(),
    }))
}
