//! Postgres repository implementation using Diesel.
//!
//! Tables: `users`, `analyses` and the `analytics` audit trail. Schema
//! changes live under `migrations/` and are applied on startup.
//!
//! ## Features
//!
//! - Connection pooling with r2d2
//! - Automatic retry for transient failures
//! - Pool statistics for the health endpoint
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL` or `PG_DATABASE_URL`: Connection string (required)
//! - `PG_POOL_MAX`: Maximum pool size (default: 10)
//! - `PG_POOL_MIN`: Minimum pool size (default: 1)
//! - `PG_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 30)
//! - `PG_IDLE_TIMEOUT_SEC`: Idle connection timeout in seconds (default: 600)
//! - `PG_MAX_RETRIES`: Maximum retry attempts for transient failures (default: 3)
//! - `PG_RETRY_DELAY_MS`: Initial retry delay in milliseconds (default: 100)

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use diesel::dsl::{count_star, max, min, sum};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel::sql_types::Timestamptz;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;

use crate::db::models::*;
use crate::db::repository::{
    AnalysisRepository, AuditRepository, ErrorContext, RepositoryError, RepositoryResult,
    UserRepository,
};
use crate::models::{
    display_name, Analysis, AnalysisId, AnalysisType, AuditEvent, AuditEventId, NewAnalysis,
    NewAuditEvent, NewUser, User, UserId, UserRole,
};

mod models;
mod schema;

use models::*;
use schema::*;

type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/postgres/migrations");

/// Configuration for connecting to Postgres.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_pool_size: u32,
    /// Minimum number of connections in the pool
    pub min_pool_size: u32,
    /// Connection timeout in seconds
    pub connection_timeout_sec: u64,
    /// Idle connection timeout in seconds
    pub idle_timeout_sec: u64,
    /// Maximum number of retry attempts for transient failures
    pub max_retries: u32,
    /// Initial retry delay in milliseconds (doubles with each retry)
    pub retry_delay_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: 10,
            min_pool_size: 1,
            connection_timeout_sec: 30,
            idle_timeout_sec: 600,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl PostgresConfig {
    /// Create configuration from environment variables (see module docs).
    pub fn from_env() -> RepositoryResult<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .map_err(|_| {
                RepositoryError::configuration("DATABASE_URL or PG_DATABASE_URL must be set")
            })?;

        let defaults = Self::default();
        Ok(Self {
            database_url,
            max_pool_size: env_parse("PG_POOL_MAX", defaults.max_pool_size),
            min_pool_size: env_parse("PG_POOL_MIN", defaults.min_pool_size),
            connection_timeout_sec: env_parse("PG_CONN_TIMEOUT_SEC", defaults.connection_timeout_sec),
            idle_timeout_sec: env_parse("PG_IDLE_TIMEOUT_SEC", defaults.idle_timeout_sec),
            max_retries: env_parse("PG_MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: env_parse("PG_RETRY_DELAY_MS", defaults.retry_delay_ms),
        })
    }

    /// Create a new configuration with a database URL.
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }
}

/// Pool health statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub connections_in_use: u32,
    pub idle_connections: u32,
    pub total_connections: u32,
    pub max_size: u32,
    pub total_queries: u64,
    pub failed_queries: u64,
    pub retried_operations: u64,
}

/// Backoff settings for transient failures.
#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
}

impl From<&PostgresConfig> for RetryPolicy {
    fn from(config: &PostgresConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

#[derive(Debug, Default)]
struct QueryCounters {
    total: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

/// Call `attempt_once` until it succeeds, fails with a non-retryable error
/// or runs out of retries. The delay doubles after every retry. Blocks the
/// calling thread while waiting.
fn run_with_retry<T>(
    policy: RetryPolicy,
    counters: &QueryCounters,
    mut attempt_once: impl FnMut(u32) -> RepositoryResult<T>,
) -> RepositoryResult<T> {
    let mut delay = policy.initial_delay;
    let mut attempt = 0;
    loop {
        match attempt_once(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                tracing::warn!(attempt = attempt + 1, error = %e, "Retrying query");
                counters.retried.fetch_add(1, Ordering::Relaxed);
                std::thread::sleep(delay);
                delay *= 2;
                attempt += 1;
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        }
    }
}

/// Diesel-backed repository for Postgres.
#[derive(Clone, Debug)]
pub struct PostgresRepository {
    pool: PgPool,
    config: PostgresConfig,
    counters: Arc<QueryCounters>,
}

impl PostgresRepository {
    /// Create a new repository and run pending migrations.
    ///
    /// This blocks while the pool fills; call it from `spawn_blocking` inside
    /// an async context.
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);

        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_pool_size))
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_sec)))
            .test_on_check_out(true)
            .build(manager)
            .map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("create_pool")
                        .with_details(format!("max_size={}", config.max_pool_size)),
                )
            })?;

        {
            let mut conn = pool.get().map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("get_connection_for_migrations"),
                )
            })?;
            conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
                RepositoryError::internal_with_context(
                    format!("Migration failed: {}", e),
                    ErrorContext::new("run_migrations"),
                )
            })?;
        }

        Ok(Self {
            pool,
            config,
            counters: Arc::new(QueryCounters::default()),
        })
    }

    /// Run `f` on a pooled connection inside `spawn_blocking`, retrying
    /// retryable failures with exponential backoff.
    async fn with_conn<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static + Clone,
    {
        let pool = self.pool.clone();
        let policy = RetryPolicy::from(&self.config);
        let counters = Arc::clone(&self.counters);

        task::spawn_blocking(move || {
            run_with_retry(policy, &counters, |attempt| {
                let mut conn = pool.get().map_err(|e| {
                    RepositoryError::connection_with_context(
                        e.to_string(),
                        ErrorContext::new("get_connection")
                            .with_details(format!("attempt={}", attempt + 1)),
                    )
                })?;
                counters.total.fetch_add(1, Ordering::Relaxed);
                f.clone()(&mut conn)
            })
        })
        .await
        .map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Task join error: {}", e),
                ErrorContext::new("spawn_blocking"),
            )
        })?
    }

    /// Current pool state and query counters.
    pub fn get_pool_stats(&self) -> PoolStats {
        let state = self.pool.state();
        PoolStats {
            connections_in_use: state.connections - state.idle_connections,
            idle_connections: state.idle_connections,
            total_connections: state.connections,
            max_size: self.config.max_pool_size,
            total_queries: self.counters.total.load(Ordering::Relaxed),
            failed_queries: self.counters.failed.load(Ordering::Relaxed),
            retried_operations: self.counters.retried.load(Ordering::Relaxed),
        }
    }
}

fn map_diesel_error(err: diesel::result::Error) -> RepositoryError {
    RepositoryError::from(err)
}

/// `%needle%` with LIKE metacharacters escaped.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn to_u64(n: i64) -> u64 {
    n.max(0) as u64
}

fn row_to_user(row: UserRow) -> RepositoryResult<User> {
    let role = UserRole::from_str(&row.role).map_err(|e| {
        RepositoryError::internal_with_context(
            e,
            ErrorContext::new("row_to_user")
                .with_entity("user")
                .with_entity_id(row.id),
        )
    })?;
    Ok(User {
        id: UserId(row.id),
        email: row.email,
        password_hash: row.password_hash,
        first_name: row.first_name,
        last_name: row.last_name,
        role,
        subscription_status: row.subscription_status,
        stripe_customer_id: row.stripe_customer_id,
        is_active: row.is_active,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn parse_analysis_type(raw: &str, id: i64) -> RepositoryResult<AnalysisType> {
    AnalysisType::from_str(raw).map_err(|e| {
        RepositoryError::internal_with_context(
            e,
            ErrorContext::new("parse_analysis_type")
                .with_entity("analysis")
                .with_entity_id(id),
        )
    })
}

fn row_to_analysis(row: AnalysisRow) -> RepositoryResult<Analysis> {
    Ok(Analysis {
        id: AnalysisId(row.id),
        user_id: row.user_id.map(UserId),
        analysis_type: parse_analysis_type(&row.analysis_type, row.id)?,
        property_address: row.property_address,
        acquisition_notes: row.acquisition_notes,
        ai_analysis: row.ai_analysis,
        tokens_used: row.tokens_used as i64,
        created_at: row.created_at,
    })
}

fn row_to_summary(row: AnalysisRow) -> RepositoryResult<AnalysisSummary> {
    let analysis = row_to_analysis(row)?;
    Ok(AnalysisSummary {
        preview: analysis.preview(),
        id: analysis.id,
        user_id: analysis.user_id,
        property_address: analysis.property_address,
        acquisition_notes: analysis.acquisition_notes,
        analysis_type: analysis.analysis_type,
        tokens_used: analysis.tokens_used,
        created_at: analysis.created_at,
    })
}

fn owner_from_columns((email, first, last): OwnerColumns) -> Option<OwnerInfo> {
    email.map(|email| OwnerInfo {
        email,
        name: display_name(first.as_deref(), last.as_deref()),
    })
}

fn user_not_found(user_id: UserId, operation: &str) -> RepositoryError {
    RepositoryError::not_found_with_context(
        format!("User {} not found", user_id),
        ErrorContext::new(operation)
            .with_entity("user")
            .with_entity_id(user_id),
    )
}

#[async_trait]
impl UserRepository for PostgresRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn(|conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn create_user(&self, user: &NewUser) -> RepositoryResult<User> {
        let row = NewUserRow {
            email: user.email.to_lowercase(),
            password_hash: user.password_hash.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role.as_str().to_string(),
        };
        self.with_conn(move |conn| {
            let inserted: UserRow = diesel::insert_into(users::table)
                .values(&row)
                .returning(UserRow::as_returning())
                .get_result(conn)
                .map_err(|e| map_diesel_error(e).with_operation("create_user"))?;
            row_to_user(inserted)
        })
        .await
    }

    async fn get_user(&self, user_id: UserId) -> RepositoryResult<User> {
        self.with_conn(move |conn| {
            let row = users::table
                .find(user_id.0)
                .select(UserRow::as_select())
                .first::<UserRow>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .ok_or_else(|| user_not_found(user_id, "get_user"))?;
            row_to_user(row)
        })
        .await
    }

    async fn find_user_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        let email = email.to_lowercase();
        self.with_conn(move |conn| {
            users::table
                .filter(users::email.eq(&email))
                .select(UserRow::as_select())
                .first::<UserRow>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .map(row_to_user)
                .transpose()
        })
        .await
    }

    async fn find_user_by_stripe_customer(
        &self,
        customer_id: &str,
    ) -> RepositoryResult<Option<User>> {
        let customer_id = customer_id.to_string();
        self.with_conn(move |conn| {
            users::table
                .filter(users::stripe_customer_id.eq(&customer_id))
                .select(UserRow::as_select())
                .first::<UserRow>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .map(row_to_user)
                .transpose()
        })
        .await
    }

    async fn set_user_active(&self, user_id: UserId, active: bool) -> RepositoryResult<()> {
        self.with_conn(move |conn| {
            let updated = diesel::update(users::table.find(user_id.0))
                .set((users::is_active.eq(active), users::updated_at.eq(Utc::now())))
                .execute(conn)
                .map_err(map_diesel_error)?;
            if updated == 0 {
                return Err(user_not_found(user_id, "set_user_active"));
            }
            Ok(())
        })
        .await
    }

    async fn set_subscription_status(
        &self,
        user_id: UserId,
        status: &str,
    ) -> RepositoryResult<()> {
        let status = status.to_string();
        self.with_conn(move |conn| {
            let updated = diesel::update(users::table.find(user_id.0))
                .set((
                    users::subscription_status.eq(&status),
                    users::updated_at.eq(Utc::now()),
                ))
                .execute(conn)
                .map_err(map_diesel_error)?;
            if updated == 0 {
                return Err(user_not_found(user_id, "set_subscription_status"));
            }
            Ok(())
        })
        .await
    }

    async fn set_stripe_customer_id(
        &self,
        user_id: UserId,
        customer_id: &str,
    ) -> RepositoryResult<()> {
        let customer_id = customer_id.to_string();
        self.with_conn(move |conn| {
            let updated = diesel::update(users::table.find(user_id.0))
                .set((
                    users::stripe_customer_id.eq(Some(&customer_id)),
                    users::updated_at.eq(Utc::now()),
                ))
                .execute(conn)
                .map_err(map_diesel_error)?;
            if updated == 0 {
                return Err(user_not_found(user_id, "set_stripe_customer_id"));
            }
            Ok(())
        })
        .await
    }

    async fn list_users(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> RepositoryResult<Paged<UserWithUsage>> {
        let pattern = filter.search.as_deref().map(like_pattern);
        self.with_conn(move |conn| {
            let mut count_query = users::table.into_boxed();
            let mut page_query = users::table.into_boxed();
            if let Some(p) = &pattern {
                count_query = count_query.filter(
                    users::email
                        .ilike(p.clone())
                        .nullable()
                        .or(users::first_name.ilike(p.clone()))
                        .or(users::last_name.ilike(p.clone())),
                );
                page_query = page_query.filter(
                    users::email
                        .ilike(p.clone())
                        .nullable()
                        .or(users::first_name.ilike(p.clone()))
                        .or(users::last_name.ilike(p.clone())),
                );
            }

            let total: i64 = count_query
                .count()
                .get_result(conn)
                .map_err(map_diesel_error)?;

            let rows: Vec<UserRow> = page_query
                .select(UserRow::as_select())
                .order((users::created_at.desc(), users::id.desc()))
                .offset(page.offset() as i64)
                .limit(page.limit() as i64)
                .load(conn)
                .map_err(map_diesel_error)?;

            let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
            let usage: HashMap<i64, (i64, Option<i64>, Option<DateTime<Utc>>)> =
                analyses::table
                    .filter(analyses::user_id.eq_any(ids))
                    .group_by(analyses::user_id)
                    .select((
                        analyses::user_id,
                        count_star(),
                        sum(analyses::tokens_used),
                        max(analyses::created_at),
                    ))
                    .load::<(Option<i64>, i64, Option<i64>, Option<DateTime<Utc>>)>(conn)
                    .map_err(map_diesel_error)?
                    .into_iter()
                    .filter_map(|(uid, count, tokens, last)| uid.map(|u| (u, (count, tokens, last))))
                    .collect();

            let mut items = Vec::with_capacity(rows.len());
            for row in rows {
                let (count, tokens, last) = usage.get(&row.id).copied().unwrap_or((0, None, None));
                items.push(UserWithUsage {
                    user: row_to_user(row)?,
                    total_analyses: to_u64(count),
                    total_tokens: tokens.unwrap_or(0),
                    last_analysis: last,
                });
            }

            Ok(Paged::new(items, to_u64(total)))
        })
        .await
    }
}

#[async_trait]
impl AnalysisRepository for PostgresRepository {
    async fn insert_analysis(&self, analysis: &NewAnalysis) -> RepositoryResult<Analysis> {
        let row = NewAnalysisRow {
            user_id: analysis.user_id.map(|u| u.0),
            property_address: analysis.property_address.clone(),
            acquisition_notes: analysis.acquisition_notes.clone(),
            ai_analysis: analysis.ai_analysis.clone(),
            analysis_type: analysis.analysis_type.as_str().to_string(),
            tokens_used: i32::try_from(analysis.tokens_used).unwrap_or(i32::MAX),
        };
        self.with_conn(move |conn| {
            let inserted: AnalysisRow = diesel::insert_into(analyses::table)
                .values(&row)
                .returning(AnalysisRow::as_returning())
                .get_result(conn)
                .map_err(|e| map_diesel_error(e).with_operation("insert_analysis"))?;
            row_to_analysis(inserted)
        })
        .await
    }

    async fn get_analysis_for_user(
        &self,
        analysis_id: AnalysisId,
        user_id: UserId,
    ) -> RepositoryResult<Analysis> {
        self.with_conn(move |conn| {
            let row = analyses::table
                .filter(analyses::id.eq(analysis_id.0))
                .filter(analyses::user_id.eq(user_id.0))
                .select(AnalysisRow::as_select())
                .first::<AnalysisRow>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .ok_or_else(|| {
                    RepositoryError::not_found_with_context(
                        format!("Analysis {} not found", analysis_id),
                        ErrorContext::new("get_analysis_for_user")
                            .with_entity("analysis")
                            .with_entity_id(analysis_id),
                    )
                })?;
            row_to_analysis(row)
        })
        .await
    }

    async fn list_user_analyses(
        &self,
        user_id: UserId,
        search: Option<&str>,
        page: PageRequest,
    ) -> RepositoryResult<Paged<AnalysisSummary>> {
        let pattern = search.map(like_pattern);
        self.with_conn(move |conn| {
            let mut count_query = analyses::table
                .filter(analyses::user_id.eq(user_id.0))
                .into_boxed();
            let mut page_query = analyses::table
                .filter(analyses::user_id.eq(user_id.0))
                .into_boxed();
            if let Some(p) = &pattern {
                count_query = count_query.filter(
                    analyses::property_address
                        .ilike(p.clone())
                        .nullable()
                        .or(analyses::acquisition_notes.ilike(p.clone())),
                );
                page_query = page_query.filter(
                    analyses::property_address
                        .ilike(p.clone())
                        .nullable()
                        .or(analyses::acquisition_notes.ilike(p.clone())),
                );
            }

            let total: i64 = count_query
                .count()
                .get_result(conn)
                .map_err(map_diesel_error)?;

            let rows: Vec<AnalysisRow> = page_query
                .select(AnalysisRow::as_select())
                .order((analyses::created_at.desc(), analyses::id.desc()))
                .offset(page.offset() as i64)
                .limit(page.limit() as i64)
                .load(conn)
                .map_err(map_diesel_error)?;

            let items = rows
                .into_iter()
                .map(row_to_summary)
                .collect::<RepositoryResult<Vec<_>>>()?;
            Ok(Paged::new(items, to_u64(total)))
        })
        .await
    }

    async fn delete_analysis_for_user(
        &self,
        analysis_id: AnalysisId,
        user_id: UserId,
    ) -> RepositoryResult<bool> {
        self.with_conn(move |conn| {
            let deleted = diesel::delete(
                analyses::table
                    .filter(analyses::id.eq(analysis_id.0))
                    .filter(analyses::user_id.eq(user_id.0)),
            )
            .execute(conn)
            .map_err(map_diesel_error)?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn user_analysis_stats(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> RepositoryResult<UserAnalysisStats> {
        self.with_conn(move |conn| {
            let (total, tokens, first, last): (
                i64,
                Option<i64>,
                Option<DateTime<Utc>>,
                Option<DateTime<Utc>>,
            ) = analyses::table
                .filter(analyses::user_id.eq(user_id.0))
                .select((
                    count_star(),
                    sum(analyses::tokens_used),
                    min(analyses::created_at),
                    max(analyses::created_at),
                ))
                .first(conn)
                .map_err(map_diesel_error)?;

            let recent: i64 = analyses::table
                .filter(analyses::user_id.eq(user_id.0))
                .filter(analyses::created_at.ge(since))
                .count()
                .get_result(conn)
                .map_err(map_diesel_error)?;

            let by_type: BTreeMap<String, u64> = analyses::table
                .filter(analyses::user_id.eq(user_id.0))
                .group_by(analyses::analysis_type)
                .select((analyses::analysis_type, count_star()))
                .load::<(String, i64)>(conn)
                .map_err(map_diesel_error)?
                .into_iter()
                .map(|(t, c)| (t, to_u64(c)))
                .collect();

            Ok(UserAnalysisStats {
                total_analyses: to_u64(total),
                total_tokens: tokens.unwrap_or(0),
                first_analysis: first,
                last_analysis: last,
                recent_analyses: to_u64(recent),
                by_type,
            })
        })
        .await
    }

    async fn count_user_analyses_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> RepositoryResult<u64> {
        self.with_conn(move |conn| {
            let count: i64 = analyses::table
                .filter(analyses::user_id.eq(user_id.0))
                .filter(analyses::created_at.ge(since))
                .count()
                .get_result(conn)
                .map_err(map_diesel_error)?;
            Ok(to_u64(count))
        })
        .await
    }

    async fn list_all_analyses(
        &self,
        filter: &AnalysisFilter,
        page: PageRequest,
    ) -> RepositoryResult<Paged<AdminAnalysisRow>> {
        let type_filter = filter.analysis_type.map(|t| t.as_str().to_string());
        let user_filter = filter.user_id.map(|u| u.0);
        self.with_conn(move |conn| {
            let mut count_query = analyses::table.into_boxed();
            let mut page_query = analyses::table.left_join(users::table).into_boxed();
            if let Some(t) = &type_filter {
                count_query = count_query.filter(analyses::analysis_type.eq(t.clone()));
                page_query = page_query.filter(analyses::analysis_type.eq(t.clone()));
            }
            if let Some(u) = user_filter {
                count_query = count_query.filter(analyses::user_id.eq(u));
                page_query = page_query.filter(analyses::user_id.eq(u));
            }

            let total: i64 = count_query
                .count()
                .get_result(conn)
                .map_err(map_diesel_error)?;

            let rows: Vec<(AnalysisRow, OwnerColumns)> = page_query
                .select((
                    AnalysisRow::as_select(),
                    (
                        users::email.nullable(),
                        users::first_name.nullable(),
                        users::last_name.nullable(),
                    ),
                ))
                .order((analyses::created_at.desc(), analyses::id.desc()))
                .offset(page.offset() as i64)
                .limit(page.limit() as i64)
                .load(conn)
                .map_err(map_diesel_error)?;

            let mut items = Vec::with_capacity(rows.len());
            for (row, owner) in rows {
                items.push(AdminAnalysisRow {
                    summary: row_to_summary(row)?,
                    owner: owner_from_columns(owner),
                });
            }
            Ok(Paged::new(items, to_u64(total)))
        })
        .await
    }

    async fn platform_stats(&self, now: DateTime<Utc>) -> RepositoryResult<PlatformStats> {
        let month_ago = now - ChronoDuration::days(30);
        let week_ago = now - ChronoDuration::days(7);
        self.with_conn(move |conn| {
            let total_users: i64 = users::table
                .count()
                .get_result(conn)
                .map_err(map_diesel_error)?;
            let new_users: i64 = users::table
                .filter(users::created_at.ge(month_ago))
                .count()
                .get_result(conn)
                .map_err(map_diesel_error)?;
            let active_users: i64 = users::table
                .filter(users::is_active.eq(true))
                .count()
                .get_result(conn)
                .map_err(map_diesel_error)?;

            let (total_analyses, total_tokens): (i64, Option<i64>) = analyses::table
                .select((count_star(), sum(analyses::tokens_used)))
                .first(conn)
                .map_err(map_diesel_error)?;
            let recent_analyses: i64 = analyses::table
                .filter(analyses::created_at.ge(month_ago))
                .count()
                .get_result(conn)
                .map_err(map_diesel_error)?;

            let by_type: BTreeMap<String, TypeUsage> = analyses::table
                .group_by(analyses::analysis_type)
                .select((
                    analyses::analysis_type,
                    count_star(),
                    sum(analyses::tokens_used),
                ))
                .load::<(String, i64, Option<i64>)>(conn)
                .map_err(map_diesel_error)?
                .into_iter()
                .map(|(t, count, tokens)| {
                    (
                        t,
                        TypeUsage {
                            count: to_u64(count),
                            tokens: tokens.unwrap_or(0),
                        },
                    )
                })
                .collect();

            let top_users = sql_query(
                "SELECT u.id, u.email, u.first_name, u.last_name, \
                        COUNT(a.id) AS total_analyses, \
                        COALESCE(SUM(a.tokens_used), 0)::BIGINT AS total_tokens \
                 FROM users u LEFT JOIN analyses a ON a.user_id = u.id \
                 GROUP BY u.id \
                 ORDER BY total_analyses DESC, u.id ASC \
                 LIMIT 10",
            )
            .load::<TopUserRow>(conn)
            .map_err(map_diesel_error)?
            .into_iter()
            .map(|r| TopUser {
                id: UserId(r.id),
                name: display_name(r.first_name.as_deref(), r.last_name.as_deref()),
                email: r.email,
                total_analyses: to_u64(r.total_analyses),
                total_tokens: r.total_tokens,
            })
            .collect();

            let daily_usage = sql_query(
                "SELECT (created_at AT TIME ZONE 'UTC')::DATE AS day, COUNT(*) AS analyses \
                 FROM analyses WHERE created_at >= $1 \
                 GROUP BY day ORDER BY day DESC",
            )
            .bind::<Timestamptz, _>(week_ago)
            .load::<DailyUsageRow>(conn)
            .map_err(map_diesel_error)?
            .into_iter()
            .map(|r| DailyUsage {
                date: r.day,
                analyses: to_u64(r.analyses),
            })
            .collect();

            let total_tokens = total_tokens.unwrap_or(0);
            let avg_tokens_per_analysis = if total_analyses > 0 {
                total_tokens as f64 / total_analyses as f64
            } else {
                0.0
            };

            Ok(PlatformStats {
                total_users: to_u64(total_users),
                new_users_last_30_days: to_u64(new_users),
                active_users: to_u64(active_users),
                total_analyses: to_u64(total_analyses),
                analyses_last_30_days: to_u64(recent_analyses),
                total_tokens,
                avg_tokens_per_analysis,
                by_type,
                top_users,
                daily_usage,
            })
        })
        .await
    }
}

#[async_trait]
impl AuditRepository for PostgresRepository {
    async fn record_event(&self, event: &NewAuditEvent) -> RepositoryResult<()> {
        let row = NewAuditRow {
            user_id: event.user_id.map(|u| u.0),
            action: event.action.as_str().to_string(),
            details: Some(event.details.clone()),
        };
        self.with_conn(move |conn| {
            diesel::insert_into(analytics::table)
                .values(&row)
                .execute(conn)
                .map(|_| ())
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn list_events(
        &self,
        action: Option<&str>,
        page: PageRequest,
    ) -> RepositoryResult<Paged<AuditEntry>> {
        let action = action.map(str::to_string);
        self.with_conn(move |conn| {
            let mut count_query = analytics::table.into_boxed();
            let mut page_query = analytics::table.left_join(users::table).into_boxed();
            if let Some(a) = &action {
                count_query = count_query.filter(analytics::action.eq(a.clone()));
                page_query = page_query.filter(analytics::action.eq(a.clone()));
            }

            let total: i64 = count_query
                .count()
                .get_result(conn)
                .map_err(map_diesel_error)?;

            let rows: Vec<(AuditRow, OwnerColumns)> = page_query
                .select((
                    AuditRow::as_select(),
                    (
                        users::email.nullable(),
                        users::first_name.nullable(),
                        users::last_name.nullable(),
                    ),
                ))
                .order((analytics::created_at.desc(), analytics::id.desc()))
                .offset(page.offset() as i64)
                .limit(page.limit() as i64)
                .load(conn)
                .map_err(map_diesel_error)?;

            let items = rows
                .into_iter()
                .map(|(row, owner)| AuditEntry {
                    event: AuditEvent {
                        id: AuditEventId(row.id),
                        user_id: row.user_id.map(UserId),
                        action: row.action,
                        details: row.details,
                        created_at: row.created_at,
                    },
                    user: owner_from_columns(owner),
                })
                .collect();
            Ok(Paged::new(items, to_u64(total)))
        })
        .await
    }
}
