//! Query-side models returned by the repository layer.
//!
//! Domain entities live in [`crate::models`]; this module holds the
//! paging primitives, filters and aggregate shapes that only exist as query
//! results.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{AnalysisId, AnalysisType, AuditEvent, User, UserId};

/// Largest page size accepted from clients.
pub const MAX_PAGE_SIZE: u32 = 100;

/// A validated page request.
///
/// `page` is 1-based. Construction clamps both values so repository
/// implementations can trust them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Build from raw query parameters, falling back to `default_limit`.
    pub fn from_query(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> Self {
        Self::new(page.unwrap_or(1), limit.unwrap_or(default_limit))
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

/// One page of rows plus the total matching count.
#[derive(Debug, Clone, PartialEq)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, total: u64) -> Self {
        Self { items, total }
    }
}

/// Lightweight analysis row for history listings (no full report body).
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSummary {
    pub id: AnalysisId,
    pub user_id: Option<UserId>,
    pub property_address: String,
    pub acquisition_notes: Option<String>,
    pub analysis_type: AnalysisType,
    pub tokens_used: i64,
    pub created_at: DateTime<Utc>,
    pub preview: String,
}

/// Owner information attached to admin listings.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerInfo {
    pub email: String,
    pub name: String,
}

/// Analysis row for the admin listing.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminAnalysisRow {
    pub summary: AnalysisSummary,
    /// `None` for anonymous analyses.
    pub owner: Option<OwnerInfo>,
}

/// Audit row joined with the acting user.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub event: AuditEvent,
    pub user: Option<OwnerInfo>,
}

/// Account plus usage counters for the admin user list.
#[derive(Debug, Clone, PartialEq)]
pub struct UserWithUsage {
    pub user: User,
    pub total_analyses: u64,
    pub total_tokens: i64,
    pub last_analysis: Option<DateTime<Utc>>,
}

/// Filter for the admin user list.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Case-insensitive substring over email, first and last name.
    pub search: Option<String>,
}

/// Filter for the admin analysis list.
#[derive(Debug, Clone, Default)]
pub struct AnalysisFilter {
    pub analysis_type: Option<AnalysisType>,
    pub user_id: Option<UserId>,
}

/// Per-user aggregate shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserAnalysisStats {
    pub total_analyses: u64,
    pub total_tokens: i64,
    pub first_analysis: Option<DateTime<Utc>>,
    pub last_analysis: Option<DateTime<Utc>>,
    /// Analyses created at or after the `since` bound passed in.
    pub recent_analyses: u64,
    pub by_type: BTreeMap<String, u64>,
}

/// Count and token sum for one analysis type.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TypeUsage {
    pub count: u64,
    pub tokens: i64,
}

/// Heaviest users for the admin dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct TopUser {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub total_analyses: u64,
    pub total_tokens: i64,
}

/// Analyses per calendar day (UTC).
#[derive(Debug, Clone, PartialEq)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub analyses: u64,
}

/// Platform-wide aggregate for the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlatformStats {
    pub total_users: u64,
    pub new_users_last_30_days: u64,
    pub active_users: u64,
    pub total_analyses: u64,
    pub analyses_last_30_days: u64,
    pub total_tokens: i64,
    pub avg_tokens_per_analysis: f64,
    pub by_type: BTreeMap<String, TypeUsage>,
    /// At most ten entries, most analyses first.
    pub top_users: Vec<TopUser>,
    /// Last seven days, newest first; days without analyses are omitted.
    pub daily_usage: Vec<DailyUsage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_clamps_bounds() {
        let req = PageRequest::new(0, 0);
        assert_eq!(req.page(), 1);
        assert_eq!(req.limit(), 1);

        let req = PageRequest::new(3, 500);
        assert_eq!(req.limit(), MAX_PAGE_SIZE);
    }

    #[test]
    fn test_page_request_offset() {
        assert_eq!(PageRequest::new(1, 10).offset(), 0);
        assert_eq!(PageRequest::new(4, 25).offset(), 75);
    }

    #[test]
    fn test_from_query_defaults() {
        let req = PageRequest::from_query(None, None, 20);
        assert_eq!((req.page(), req.limit()), (1, 20));
    }
}
