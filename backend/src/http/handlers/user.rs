//! `/api/user/*`: the caller's own history, stats and profile.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{Duration, Utc};
use serde_json::json;

use super::{parse_id, record_audit, HandlerResult};
use crate::http::dto::{
    AnalysisListResponse, MessageResponse, PageQuery, SearchQuery, UserDto, UserResponse,
    UserStatsResponse, USER_PAGE_SIZE,
};
use crate::http::error::AppError;
use crate::http::extract::AuthUser;
use crate::http::state::AppState;
use crate::models::{AnalysisId, AuditAction};
use crate::services::validation::validate_search;
use crate::services::Pagination;

/// Window for the "recent analyses" counter.
const RECENT_DAYS: i64 = 30;

/// GET /api/user/analyses
pub async fn list_analyses(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<PageQuery>,
) -> HandlerResult<AnalysisListResponse> {
    let page = query.page_request(USER_PAGE_SIZE);
    let paged = state
        .repository
        .list_user_analyses(user.id, None, page)
        .await?;

    Ok(Json(AnalysisListResponse {
        success: true,
        pagination: Pagination::new(page, paged.total),
        analyses: paged.items.into_iter().map(Into::into).collect(),
        search_query: None,
    }))
}

/// GET /api/user/analyses/search?q=
pub async fn search_analyses(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<SearchQuery>,
) -> HandlerResult<AnalysisListResponse> {
    let term = validate_search(query.q.as_deref())?;
    let page = query.page_request();
    let paged = state
        .repository
        .list_user_analyses(user.id, Some(&term), page)
        .await?;

    Ok(Json(AnalysisListResponse {
        success: true,
        pagination: Pagination::new(page, paged.total),
        analyses: paged.items.into_iter().map(Into::into).collect(),
        search_query: Some(term),
    }))
}

/// DELETE /api/user/analyses/{id}
pub async fn delete_analysis(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(raw_id): Path<String>,
) -> HandlerResult<MessageResponse> {
    let id: AnalysisId = parse_id(&raw_id, "Invalid analysis ID")?;
    if !state
        .repository
        .delete_analysis_for_user(id, user.id)
        .await?
    {
        return Err(AppError::NotFound("Analysis not found".to_string()));
    }

    record_audit(
        &state,
        AuditAction::AnalysisDeleted,
        Some(user.id),
        json!({ "analysisId": id }),
    )
    .await;

    Ok(Json(MessageResponse::new("Analysis deleted successfully")))
}

/// GET /api/user/stats
pub async fn stats(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> HandlerResult<UserStatsResponse> {
    let since = Utc::now() - Duration::days(RECENT_DAYS);
    let stats = state.repository.user_analysis_stats(user.id, since).await?;
    Ok(Json(UserStatsResponse {
        success: true,
        stats: stats.into(),
    }))
}

/// GET /api/user/profile
pub async fn profile(AuthUser(user): AuthUser) -> Json<UserResponse> {
    Json(UserResponse {
        success: true,
        message: None,
        user: UserDto::from(&user),
    })
}
