//! Public API surface for the backend.
//!
//! This file consolidates the response DTOs of the HTTP API together with the
//! domain types they are built from. Every DTO serializes to camelCase JSON
//! and is independent of axum, so clients of the library can deserialize
//! responses with the same types.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use crate::db::models::{
    AdminAnalysisRow, AnalysisFilter, AnalysisSummary, AuditEntry, OwnerInfo, PageRequest,
    Paged, PlatformStats, UserAnalysisStats, UserFilter, UserWithUsage,
};
pub use crate::models::{
    Analysis, AnalysisId, AnalysisType, AuditAction, AuditEvent, AuditEventId, User, UserId,
    UserRole,
};
pub use crate::services::billing::{Plan, SubscriptionSummary};
pub use crate::services::pagination::Pagination;

use crate::services::analysis::AnalysisOutcome;

/// Public view of an account. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: UserId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: UserRole,
    pub subscription_status: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserDto {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            subscription_status: user.subscription_status.clone(),
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

/// A stored analysis, full report included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisDto {
    pub id: AnalysisId,
    pub property_address: String,
    pub acquisition_notes: Option<String>,
    pub ai_analysis: String,
    pub analysis_type: AnalysisType,
    pub tokens_used: i64,
    pub created_at: DateTime<Utc>,
}

impl From<Analysis> for AnalysisDto {
    fn from(a: Analysis) -> Self {
        Self {
            id: a.id,
            property_address: a.property_address,
            acquisition_notes: a.acquisition_notes,
            ai_analysis: a.ai_analysis,
            analysis_type: a.analysis_type,
            tokens_used: a.tokens_used,
            created_at: a.created_at,
        }
    }
}

/// Response payload of a fresh submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResultDto {
    #[serde(flatten)]
    pub analysis: AnalysisDto,
    /// Wall time in milliseconds.
    pub processing_time: u64,
    pub is_anonymous: bool,
    pub is_demo_mode: bool,
}

impl From<AnalysisOutcome> for AnalysisResultDto {
    fn from(outcome: AnalysisOutcome) -> Self {
        let is_anonymous = outcome.is_anonymous();
        Self {
            analysis: outcome.analysis.into(),
            processing_time: outcome.processing_time_ms,
            is_anonymous,
            is_demo_mode: outcome.is_demo_mode,
        }
    }
}

/// History row: metadata plus a preview of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummaryDto {
    pub id: AnalysisId,
    pub property_address: String,
    pub acquisition_notes: Option<String>,
    pub analysis_type: AnalysisType,
    pub tokens_used: i64,
    pub created_at: DateTime<Utc>,
    pub preview: String,
}

impl From<AnalysisSummary> for AnalysisSummaryDto {
    fn from(s: AnalysisSummary) -> Self {
        Self {
            id: s.id,
            property_address: s.property_address,
            acquisition_notes: s.acquisition_notes,
            analysis_type: s.analysis_type,
            tokens_used: s.tokens_used,
            created_at: s.created_at,
            preview: s.preview,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerDto {
    pub email: String,
    pub name: String,
}

impl From<OwnerInfo> for OwnerDto {
    fn from(o: OwnerInfo) -> Self {
        Self {
            email: o.email,
            name: o.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAnalysisDto {
    #[serde(flatten)]
    pub summary: AnalysisSummaryDto,
    /// `null` for anonymous analyses.
    pub user: Option<OwnerDto>,
}

impl From<AdminAnalysisRow> for AdminAnalysisDto {
    fn from(row: AdminAnalysisRow) -> Self {
        Self {
            summary: row.summary.into(),
            user: row.owner.map(Into::into),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserDto {
    #[serde(flatten)]
    pub user: UserDto,
    pub total_analyses: u64,
    pub total_tokens: i64,
    pub last_analysis: Option<DateTime<Utc>>,
}

impl From<UserWithUsage> for AdminUserDto {
    fn from(u: UserWithUsage) -> Self {
        Self {
            user: UserDto::from(&u.user),
            total_analyses: u.total_analyses,
            total_tokens: u.total_tokens,
            last_analysis: u.last_analysis,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogDto {
    pub id: AuditEventId,
    pub action: String,
    pub details: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub user: Option<OwnerDto>,
}

impl From<AuditEntry> for AuditLogDto {
    fn from(entry: AuditEntry) -> Self {
        Self {
            id: entry.event.id,
            action: entry.event.action,
            details: entry.event.details,
            created_at: entry.event.created_at,
            user: entry.user.map(Into::into),
        }
    }
}

/// Dashboard counters for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatsDto {
    pub total_analyses: u64,
    pub total_tokens: i64,
    pub first_analysis: Option<DateTime<Utc>>,
    pub last_analysis: Option<DateTime<Utc>>,
    pub last_30_days: u64,
    pub analysis_by_type: BTreeMap<String, u64>,
}

impl From<UserAnalysisStats> for UserStatsDto {
    fn from(s: UserAnalysisStats) -> Self {
        Self {
            total_analyses: s.total_analyses,
            total_tokens: s.total_tokens,
            first_analysis: s.first_analysis,
            last_analysis: s.last_analysis,
            last_30_days: s.recent_analyses,
            analysis_by_type: s.by_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCountsDto {
    pub total: u64,
    pub new_last_30_days: u64,
    pub active: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisCountsDto {
    pub total: u64,
    pub last_30_days: u64,
    pub total_tokens: i64,
    pub avg_tokens: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeUsageDto {
    pub count: u64,
    pub tokens: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUserDto {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub total_analyses: u64,
    pub total_tokens: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsageDto {
    pub date: NaiveDate,
    pub analyses: u64,
}

/// Admin dashboard payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStatsDto {
    pub users: UserCountsDto,
    pub analyses: AnalysisCountsDto,
    pub analysis_by_type: BTreeMap<String, TypeUsageDto>,
    pub top_users: Vec<TopUserDto>,
    pub daily_usage: Vec<DailyUsageDto>,
}

impl From<PlatformStats> for PlatformStatsDto {
    fn from(s: PlatformStats) -> Self {
        Self {
            users: UserCountsDto {
                total: s.total_users,
                new_last_30_days: s.new_users_last_30_days,
                active: s.active_users,
            },
            analyses: AnalysisCountsDto {
                total: s.total_analyses,
                last_30_days: s.analyses_last_30_days,
                total_tokens: s.total_tokens,
                avg_tokens: s.avg_tokens_per_analysis.round() as i64,
            },
            analysis_by_type: s
                .by_type
                .into_iter()
                .map(|(k, v)| {
                    (
                        k,
                        TypeUsageDto {
                            count: v.count,
                            tokens: v.tokens,
                        },
                    )
                })
                .collect(),
            top_users: s
                .top_users
                .into_iter()
                .map(|u| TopUserDto {
                    id: u.id,
                    email: u.email,
                    name: u.name,
                    total_analyses: u.total_analyses,
                    total_tokens: u.total_tokens,
                })
                .collect(),
            daily_usage: s
                .daily_usage
                .into_iter()
                .map(|d| DailyUsageDto {
                    date: d.date,
                    analyses: d.analyses,
                })
                .collect(),
        }
    }
}
