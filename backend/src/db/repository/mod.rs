//! Repository traits for abstracting database operations.
//!
//! These traits define the interface for all persistence, allowing different
//! implementations (in-memory, PostgreSQL) to be swapped via dependency
//! injection. Handlers and services only ever see `dyn FullRepository`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{
    AdminAnalysisRow, AnalysisFilter, AnalysisSummary, AuditEntry, PageRequest, Paged,
    PlatformStats, UserAnalysisStats, UserFilter, UserWithUsage,
};
use crate::models::{
    Analysis, AnalysisId, NewAnalysis, NewAuditEvent, NewUser, User, UserId,
};

pub mod error;

pub use error::{ErrorContext, RepositoryError, RepositoryResult};

/// Repository trait for account operations.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust and allow
/// sharing across threads.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Check if the database connection is healthy.
    ///
    /// # Returns
    /// - `Ok(true)` if connection is healthy
    /// - `Ok(false)` if connection is unhealthy but no error occurred
    /// - `Err(RepositoryError)` if an error occurred during the check
    async fn health_check(&self) -> RepositoryResult<bool>;

    /// Create an account.
    ///
    /// # Returns
    /// * `Ok(User)` - The stored user with its assigned ID
    /// * `Err(RepositoryError::Conflict)` - If the email is already registered
    async fn create_user(&self, user: &NewUser) -> RepositoryResult<User>;

    /// Get an account by ID.
    ///
    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If the user doesn't exist
    async fn get_user(&self, user_id: UserId) -> RepositoryResult<User>;

    /// Look up an account by (lower-cased) email.
    async fn find_user_by_email(&self, email: &str) -> RepositoryResult<Option<User>>;

    /// Look up an account by its Stripe customer ID.
    async fn find_user_by_stripe_customer(
        &self,
        customer_id: &str,
    ) -> RepositoryResult<Option<User>>;

    /// Activate or deactivate an account.
    ///
    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If the user doesn't exist
    async fn set_user_active(&self, user_id: UserId, active: bool) -> RepositoryResult<()>;

    /// Set the subscription status (plan ID or `"free"`).
    async fn set_subscription_status(&self, user_id: UserId, status: &str)
        -> RepositoryResult<()>;

    /// Attach a Stripe customer ID to an account.
    async fn set_stripe_customer_id(
        &self,
        user_id: UserId,
        customer_id: &str,
    ) -> RepositoryResult<()>;

    /// List accounts with usage counters, newest accounts first.
    async fn list_users(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> RepositoryResult<Paged<UserWithUsage>>;
}

/// Repository trait for analysis storage and reporting.
#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    /// Store a new analysis. Anonymous analyses have no `user_id`.
    async fn insert_analysis(&self, analysis: &NewAnalysis) -> RepositoryResult<Analysis>;

    /// Get an analysis owned by `user_id`.
    ///
    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If it doesn't exist or belongs to someone else
    async fn get_analysis_for_user(
        &self,
        analysis_id: AnalysisId,
        user_id: UserId,
    ) -> RepositoryResult<Analysis>;

    /// List a user's analyses, newest first.
    ///
    /// When `search` is set, only analyses whose address or notes contain it
    /// (case-insensitive) are returned.
    async fn list_user_analyses(
        &self,
        user_id: UserId,
        search: Option<&str>,
        page: PageRequest,
    ) -> RepositoryResult<Paged<AnalysisSummary>>;

    /// Delete an analysis owned by `user_id`.
    ///
    /// # Returns
    /// * `Ok(true)` if a row was removed, `Ok(false)` if none matched
    async fn delete_analysis_for_user(
        &self,
        analysis_id: AnalysisId,
        user_id: UserId,
    ) -> RepositoryResult<bool>;

    /// Aggregate a user's history. `since` bounds the "recent" counter.
    async fn user_analysis_stats(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> RepositoryResult<UserAnalysisStats>;

    /// Count a user's analyses created at or after `since`.
    async fn count_user_analyses_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> RepositoryResult<u64>;

    /// List every analysis for the admin panel, newest first.
    async fn list_all_analyses(
        &self,
        filter: &AnalysisFilter,
        page: PageRequest,
    ) -> RepositoryResult<Paged<AdminAnalysisRow>>;

    /// Platform-wide statistics relative to `now`.
    async fn platform_stats(&self, now: DateTime<Utc>) -> RepositoryResult<PlatformStats>;
}

/// Repository trait for the audit trail (`analytics` table).
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Append an audit row.
    async fn record_event(&self, event: &NewAuditEvent) -> RepositoryResult<()>;

    /// List audit rows, newest first, optionally filtered by action name.
    async fn list_events(
        &self,
        action: Option<&str>,
        page: PageRequest,
    ) -> RepositoryResult<Paged<AuditEntry>>;
}

/// Everything the HTTP layer needs from storage.
pub trait FullRepository: UserRepository + AnalysisRepository + AuditRepository {}

impl<T> FullRepository for T where T: UserRepository + AnalysisRepository + AuditRepository {}
