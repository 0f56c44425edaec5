//! Data Transfer Objects for the HTTP API.
//!
//! Request bodies and query strings are defined here. Response payloads reuse
//! the serializable types from [`crate::api`], wrapped in the `success`
//! envelope every endpoint returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Re-export existing DTOs that are already serializable
pub use crate::api::{
    AdminAnalysisDto, AdminUserDto, AnalysisDto, AnalysisResultDto, AnalysisSummaryDto,
    AuditLogDto, Pagination, Plan, PlatformStatsDto, SubscriptionSummary, UserDto, UserStatsDto,
};
use crate::db::models::PageRequest;

/// Default page size for a user's own history.
pub const USER_PAGE_SIZE: u32 = 10;
/// Default page size for admin listings.
pub const ADMIN_PAGE_SIZE: u32 = 20;

// =============================================================================
// Requests
// =============================================================================

/// Missing string fields deserialize as empty so validation can report them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisSubmission {
    pub property_address: String,
    pub acquisition_notes: Option<String>,
    pub analysis_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusUpdate {
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub plan_id: Option<String>,
}

// =============================================================================
// Query strings
// =============================================================================
//
// Numeric parameters are taken as strings and parsed leniently: garbage falls
// back to the default instead of rejecting the request.

fn lenient<T: std::str::FromStr>(raw: Option<&str>) -> Option<T> {
    raw.and_then(|v| v.trim().parse().ok())
}

fn page_request(page: Option<&str>, limit: Option<&str>, default_limit: u32) -> PageRequest {
    PageRequest::from_query(lenient(page), lenient(limit), default_limit)
}

fn non_blank(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PageQuery {
    pub fn page_request(&self, default_limit: u32) -> PageRequest {
        page_request(self.page.as_deref(), self.limit.as_deref(), default_limit)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl SearchQuery {
    pub fn page_request(&self) -> PageRequest {
        page_request(self.page.as_deref(), self.limit.as_deref(), USER_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminUsersQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
}

impl AdminUsersQuery {
    pub fn page_request(&self) -> PageRequest {
        page_request(self.page.as_deref(), self.limit.as_deref(), ADMIN_PAGE_SIZE)
    }

    pub fn search(&self) -> Option<&str> {
        non_blank(&self.search)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAnalysesQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    #[serde(rename = "type")]
    pub analysis_type: Option<String>,
    pub user_id: Option<String>,
}

impl AdminAnalysesQuery {
    pub fn page_request(&self) -> PageRequest {
        page_request(self.page.as_deref(), self.limit.as_deref(), ADMIN_PAGE_SIZE)
    }

    pub fn analysis_type(&self) -> Option<&str> {
        non_blank(&self.analysis_type)
    }

    pub fn user_id(&self) -> Option<&str> {
        non_blank(&self.user_id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminLogsQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub action: Option<String>,
}

impl AdminLogsQuery {
    pub fn page_request(&self) -> PageRequest {
        page_request(self.page.as_deref(), self.limit.as_deref(), ADMIN_PAGE_SIZE)
    }

    pub fn action(&self) -> Option<&str> {
        non_blank(&self.action)
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the service
    pub status: String,
    /// Crate version
    pub version: String,
    pub timestamp: DateTime<Utc>,
    /// Database connection status
    pub database: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Register and login responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    pub user: UserDto,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub user: UserDto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResultResponse {
    pub success: bool,
    pub analysis: AnalysisResultDto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub success: bool,
    pub analysis: AnalysisDto,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisListResponse {
    pub success: bool,
    pub analyses: Vec<AnalysisSummaryDto>,
    pub pagination: Pagination,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStatsResponse {
    pub success: bool,
    pub stats: UserStatsDto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminStatsResponse {
    pub success: bool,
    pub stats: PlatformStatsDto,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminUsersResponse {
    pub success: bool,
    pub users: Vec<AdminUserDto>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminAnalysesResponse {
    pub success: bool,
    pub analyses: Vec<AdminAnalysisDto>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminLogsResponse {
    pub success: bool,
    pub logs: Vec<AuditLogDto>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlansResponse {
    pub success: bool,
    pub plans: &'static [Plan],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub success: bool,
    pub session_id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    pub success: bool,
    pub subscription: SubscriptionSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
}
