//! In-memory local repository implementation.
//!
//! This module provides a local implementation of all repository traits
//! suitable for unit testing and local development. All data is stored in
//! memory using `BTreeMap`s keyed by ID, providing fast, deterministic, and
//! isolated execution.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::db::models::*;
use crate::db::repository::*;
use crate::models::*;

/// In-memory local repository.
///
/// Cloning is cheap and clones share the same underlying data.
///
/// # Example
/// ```
/// use reia::db::repositories::LocalRepository;
/// use reia::db::repository::UserRepository;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let repo = LocalRepository::new();
/// assert!(repo.health_check().await.unwrap());
/// # }
/// ```
#[derive(Clone, Default)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

struct LocalData {
    users: BTreeMap<UserId, User>,
    analyses: BTreeMap<AnalysisId, Analysis>,
    events: BTreeMap<AuditEventId, AuditEvent>,

    // ID counters
    next_user_id: i64,
    next_analysis_id: i64,
    next_event_id: i64,

    // Connection health
    is_healthy: bool,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            users: BTreeMap::new(),
            analyses: BTreeMap::new(),
            events: BTreeMap::new(),
            next_user_id: 1,
            next_analysis_id: 1,
            next_event_id: 1,
            is_healthy: true,
        }
    }
}

impl LocalData {
    fn user_mut(&mut self, user_id: UserId, operation: &str) -> RepositoryResult<&mut User> {
        self.users.get_mut(&user_id).ok_or_else(|| {
            RepositoryError::not_found_with_context(
                format!("User {} not found", user_id),
                ErrorContext::new(operation)
                    .with_entity("user")
                    .with_entity_id(user_id),
            )
        })
    }

    fn owner_info(&self, user_id: Option<UserId>) -> Option<OwnerInfo> {
        user_id
            .and_then(|id| self.users.get(&id))
            .map(|u| OwnerInfo {
                email: u.email.clone(),
                name: u.display_name(),
            })
    }
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a lost connection (health check returns false).
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Number of stored analyses, regardless of owner.
    pub fn analysis_count(&self) -> usize {
        self.data.read().analyses.len()
    }

    /// Snapshot of every audit row, oldest first.
    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.data.read().events.values().cloned().collect()
    }

    /// Overwrite the creation time of an analysis. Useful for date-window tests.
    pub fn backdate_analysis(&self, analysis_id: AnalysisId, created_at: DateTime<Utc>) {
        if let Some(analysis) = self.data.write().analyses.get_mut(&analysis_id) {
            analysis.created_at = created_at;
        }
    }

    /// Overwrite the creation time of a user.
    pub fn backdate_user(&self, user_id: UserId, created_at: DateTime<Utc>) {
        if let Some(user) = self.data.write().users.get_mut(&user_id) {
            user.created_at = created_at;
        }
    }

    fn ensure_healthy(&self, operation: &str) -> RepositoryResult<()> {
        if self.data.read().is_healthy {
            Ok(())
        } else {
            Err(RepositoryError::connection_with_context(
                "Local repository marked unhealthy",
                ErrorContext::new(operation),
            ))
        }
    }
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn summarize(analysis: &Analysis) -> AnalysisSummary {
    AnalysisSummary {
        id: analysis.id,
        user_id: analysis.user_id,
        property_address: analysis.property_address.clone(),
        acquisition_notes: analysis.acquisition_notes.clone(),
        analysis_type: analysis.analysis_type,
        tokens_used: analysis.tokens_used,
        created_at: analysis.created_at,
        preview: analysis.preview(),
    }
}

/// Newest first; ties broken by higher ID so insertion order is stable.
fn newest_first<'a, I>(iter: I) -> Vec<&'a Analysis>
where
    I: Iterator<Item = &'a Analysis>,
{
    let mut rows: Vec<&Analysis> = iter.collect();
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    rows
}

fn paginate<T: Clone>(rows: &[T], page: PageRequest) -> Vec<T> {
    rows.iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl UserRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().is_healthy)
    }

    async fn create_user(&self, new_user: &NewUser) -> RepositoryResult<User> {
        self.ensure_healthy("create_user")?;
        let mut data = self.data.write();
        let email = new_user.email.to_lowercase();

        if data.users.values().any(|u| u.email == email) {
            return Err(RepositoryError::conflict_with_context(
                "Email already registered",
                ErrorContext::new("create_user").with_entity("user"),
            ));
        }

        let id = UserId(data.next_user_id);
        data.next_user_id += 1;

        let now = Utc::now();
        let user = User {
            id,
            email,
            password_hash: new_user.password_hash.clone(),
            first_name: new_user.first_name.clone(),
            last_name: new_user.last_name.clone(),
            role: new_user.role,
            subscription_status: DEFAULT_SUBSCRIPTION_STATUS.to_string(),
            stripe_customer_id: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        data.users.insert(id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: UserId) -> RepositoryResult<User> {
        self.ensure_healthy("get_user")?;
        self.data.read().users.get(&user_id).cloned().ok_or_else(|| {
            RepositoryError::not_found_with_context(
                format!("User {} not found", user_id),
                ErrorContext::new("get_user")
                    .with_entity("user")
                    .with_entity_id(user_id),
            )
        })
    }

    async fn find_user_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        self.ensure_healthy("find_user_by_email")?;
        let email = email.to_lowercase();
        Ok(self
            .data
            .read()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_user_by_stripe_customer(
        &self,
        customer_id: &str,
    ) -> RepositoryResult<Option<User>> {
        self.ensure_healthy("find_user_by_stripe_customer")?;
        Ok(self
            .data
            .read()
            .users
            .values()
            .find(|u| u.stripe_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn set_user_active(&self, user_id: UserId, active: bool) -> RepositoryResult<()> {
        self.ensure_healthy("set_user_active")?;
        let mut data = self.data.write();
        let user = data.user_mut(user_id, "set_user_active")?;
        user.is_active = active;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_subscription_status(
        &self,
        user_id: UserId,
        status: &str,
    ) -> RepositoryResult<()> {
        self.ensure_healthy("set_subscription_status")?;
        let mut data = self.data.write();
        let user = data.user_mut(user_id, "set_subscription_status")?;
        user.subscription_status = status.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_stripe_customer_id(
        &self,
        user_id: UserId,
        customer_id: &str,
    ) -> RepositoryResult<()> {
        self.ensure_healthy("set_stripe_customer_id")?;
        let mut data = self.data.write();
        let user = data.user_mut(user_id, "set_stripe_customer_id")?;
        user.stripe_customer_id = Some(customer_id.to_string());
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn list_users(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> RepositoryResult<Paged<UserWithUsage>> {
        self.ensure_healthy("list_users")?;
        let data = self.data.read();
        let needle = filter.search.as_deref().map(str::to_lowercase);

        let mut users: Vec<&User> = data
            .users
            .values()
            .filter(|u| match needle.as_deref() {
                Some(n) => {
                    contains_ci(&u.email, n)
                        || u.first_name.as_deref().is_some_and(|f| contains_ci(f, n))
                        || u.last_name.as_deref().is_some_and(|l| contains_ci(l, n))
                }
                None => true,
            })
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let rows: Vec<UserWithUsage> = users
            .iter()
            .map(|u| {
                let owned = data.analyses.values().filter(|a| a.user_id == Some(u.id));
                let (count, tokens, last) =
                    owned.fold((0u64, 0i64, None::<DateTime<Utc>>), |(c, t, l), a| {
                        (c + 1, t + a.tokens_used, l.max(Some(a.created_at)))
                    });
                UserWithUsage {
                    user: (*u).clone(),
                    total_analyses: count,
                    total_tokens: tokens,
                    last_analysis: last,
                }
            })
            .collect();

        Ok(Paged::new(paginate(&rows, page), rows.len() as u64))
    }
}

#[async_trait]
impl AnalysisRepository for LocalRepository {
    async fn insert_analysis(&self, new_analysis: &NewAnalysis) -> RepositoryResult<Analysis> {
        self.ensure_healthy("insert_analysis")?;
        let mut data = self.data.write();

        if let Some(user_id) = new_analysis.user_id {
            if !data.users.contains_key(&user_id) {
                return Err(RepositoryError::validation_with_context(
                    format!("Analysis references unknown user {}", user_id),
                    ErrorContext::new("insert_analysis").with_entity("analysis"),
                ));
            }
        }

        let id = AnalysisId(data.next_analysis_id);
        data.next_analysis_id += 1;

        let analysis = Analysis {
            id,
            user_id: new_analysis.user_id,
            property_address: new_analysis.property_address.clone(),
            acquisition_notes: new_analysis.acquisition_notes.clone(),
            ai_analysis: new_analysis.ai_analysis.clone(),
            analysis_type: new_analysis.analysis_type,
            tokens_used: new_analysis.tokens_used,
            created_at: Utc::now(),
        };
        data.analyses.insert(id, analysis.clone());
        Ok(analysis)
    }

    async fn get_analysis_for_user(
        &self,
        analysis_id: AnalysisId,
        user_id: UserId,
    ) -> RepositoryResult<Analysis> {
        self.ensure_healthy("get_analysis_for_user")?;
        self.data
            .read()
            .analyses
            .get(&analysis_id)
            .filter(|a| a.user_id == Some(user_id))
            .cloned()
            .ok_or_else(|| {
                RepositoryError::not_found_with_context(
                    format!("Analysis {} not found", analysis_id),
                    ErrorContext::new("get_analysis_for_user")
                        .with_entity("analysis")
                        .with_entity_id(analysis_id),
                )
            })
    }

    async fn list_user_analyses(
        &self,
        user_id: UserId,
        search: Option<&str>,
        page: PageRequest,
    ) -> RepositoryResult<Paged<AnalysisSummary>> {
        self.ensure_healthy("list_user_analyses")?;
        let data = self.data.read();
        let needle = search.map(str::to_lowercase);

        let rows: Vec<AnalysisSummary> = newest_first(
            data.analyses
                .values()
                .filter(|a| a.user_id == Some(user_id))
                .filter(|a| match needle.as_deref() {
                    Some(n) => {
                        contains_ci(&a.property_address, n)
                            || a.acquisition_notes
                                .as_deref()
                                .is_some_and(|notes| contains_ci(notes, n))
                    }
                    None => true,
                }),
        )
        .into_iter()
        .map(summarize)
        .collect();

        Ok(Paged::new(paginate(&rows, page), rows.len() as u64))
    }

    async fn delete_analysis_for_user(
        &self,
        analysis_id: AnalysisId,
        user_id: UserId,
    ) -> RepositoryResult<bool> {
        self.ensure_healthy("delete_analysis_for_user")?;
        let mut data = self.data.write();
        let owned = data
            .analyses
            .get(&analysis_id)
            .is_some_and(|a| a.user_id == Some(user_id));
        if owned {
            data.analyses.remove(&analysis_id);
        }
        Ok(owned)
    }

    async fn user_analysis_stats(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> RepositoryResult<UserAnalysisStats> {
        self.ensure_healthy("user_analysis_stats")?;
        let data = self.data.read();
        let mut stats = UserAnalysisStats::default();

        for analysis in data.analyses.values().filter(|a| a.user_id == Some(user_id)) {
            stats.total_analyses += 1;
            stats.total_tokens += analysis.tokens_used;
            stats.first_analysis = Some(match stats.first_analysis {
                Some(first) => first.min(analysis.created_at),
                None => analysis.created_at,
            });
            stats.last_analysis = stats.last_analysis.max(Some(analysis.created_at));
            if analysis.created_at >= since {
                stats.recent_analyses += 1;
            }
            *stats
                .by_type
                .entry(analysis.analysis_type.as_str().to_string())
                .or_insert(0) += 1;
        }

        Ok(stats)
    }

    async fn count_user_analyses_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> RepositoryResult<u64> {
        self.ensure_healthy("count_user_analyses_since")?;
        Ok(self
            .data
            .read()
            .analyses
            .values()
            .filter(|a| a.user_id == Some(user_id) && a.created_at >= since)
            .count() as u64)
    }

    async fn list_all_analyses(
        &self,
        filter: &AnalysisFilter,
        page: PageRequest,
    ) -> RepositoryResult<Paged<AdminAnalysisRow>> {
        self.ensure_healthy("list_all_analyses")?;
        let data = self.data.read();

        let rows: Vec<AdminAnalysisRow> = newest_first(
            data.analyses
                .values()
                .filter(|a| filter.analysis_type.is_none_or(|t| a.analysis_type == t))
                .filter(|a| filter.user_id.is_none_or(|u| a.user_id == Some(u))),
        )
        .into_iter()
        .map(|a| AdminAnalysisRow {
            summary: summarize(a),
            owner: data.owner_info(a.user_id),
        })
        .collect();

        Ok(Paged::new(paginate(&rows, page), rows.len() as u64))
    }

    async fn platform_stats(&self, now: DateTime<Utc>) -> RepositoryResult<PlatformStats> {
        self.ensure_healthy("platform_stats")?;
        let data = self.data.read();
        let month_ago = now - Duration::days(30);
        let week_ago = now - Duration::days(7);

        let mut stats = PlatformStats {
            total_users: data.users.len() as u64,
            new_users_last_30_days: data
                .users
                .values()
                .filter(|u| u.created_at >= month_ago)
                .count() as u64,
            active_users: data.users.values().filter(|u| u.is_active).count() as u64,
            ..Default::default()
        };

        let mut per_user: HashMap<UserId, (u64, i64)> = HashMap::new();
        let mut per_day: BTreeMap<chrono::NaiveDate, u64> = BTreeMap::new();

        for analysis in data.analyses.values() {
            stats.total_analyses += 1;
            stats.total_tokens += analysis.tokens_used;
            if analysis.created_at >= month_ago {
                stats.analyses_last_30_days += 1;
            }
            if analysis.created_at >= week_ago {
                *per_day.entry(analysis.created_at.date_naive()).or_insert(0) += 1;
            }

            let usage = stats
                .by_type
                .entry(analysis.analysis_type.as_str().to_string())
                .or_default();
            usage.count += 1;
            usage.tokens += analysis.tokens_used;

            if let Some(user_id) = analysis.user_id {
                let entry = per_user.entry(user_id).or_insert((0, 0));
                entry.0 += 1;
                entry.1 += analysis.tokens_used;
            }
        }

        if stats.total_analyses > 0 {
            stats.avg_tokens_per_analysis =
                stats.total_tokens as f64 / stats.total_analyses as f64;
        }

        let mut top: Vec<TopUser> = data
            .users
            .values()
            .map(|u| {
                let (count, tokens) = per_user.get(&u.id).copied().unwrap_or((0, 0));
                TopUser {
                    id: u.id,
                    email: u.email.clone(),
                    name: u.display_name(),
                    total_analyses: count,
                    total_tokens: tokens,
                }
            })
            .collect();
        top.sort_by(|a, b| {
            b.total_analyses
                .cmp(&a.total_analyses)
                .then(a.id.cmp(&b.id))
        });
        top.truncate(10);
        stats.top_users = top;

        stats.daily_usage = per_day
            .into_iter()
            .rev()
            .map(|(date, analyses)| DailyUsage { date, analyses })
            .collect();

        Ok(stats)
    }
}

#[async_trait]
impl AuditRepository for LocalRepository {
    async fn record_event(&self, event: &NewAuditEvent) -> RepositoryResult<()> {
        self.ensure_healthy("record_event")?;
        let mut data = self.data.write();
        let id = AuditEventId(data.next_event_id);
        data.next_event_id += 1;
        data.events.insert(
            id,
            AuditEvent {
                id,
                user_id: event.user_id,
                action: event.action.as_str().to_string(),
                details: Some(event.details.clone()),
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn list_events(
        &self,
        action: Option<&str>,
        page: PageRequest,
    ) -> RepositoryResult<Paged<AuditEntry>> {
        self.ensure_healthy("list_events")?;
        let data = self.data.read();

        let mut events: Vec<&AuditEvent> = data
            .events
            .values()
            .filter(|e| action.is_none_or(|a| e.action == a))
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let rows: Vec<AuditEntry> = events
            .into_iter()
            .map(|e| AuditEntry {
                event: e.clone(),
                user: data.owner_info(e.user_id),
            })
            .collect();

        Ok(Paged::new(paginate(&rows, page), rows.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "hash".to_string(),
            first_name: Some("Test".to_string()),
            last_name: None,
            role: UserRole::User,
        }
    }

    fn new_analysis(user_id: Option<UserId>, address: &str) -> NewAnalysis {
        NewAnalysis {
            user_id,
            property_address: address.to_string(),
            acquisition_notes: Some("needs a new roof".to_string()),
            ai_analysis: "# Report".to_string(),
            analysis_type: AnalysisType::Standard,
            tokens_used: 100,
        }
    }

    #[tokio::test]
    async fn test_create_user_lowercases_and_rejects_duplicates() {
        let repo = LocalRepository::new();
        let user = repo.create_user(&new_user("Ada@Example.com")).await.unwrap();
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.subscription_status, "free");
        assert!(user.is_active);

        let err = repo
            .create_user(&new_user("ADA@example.com"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_get_analysis_enforces_ownership() {
        let repo = LocalRepository::new();
        let owner = repo.create_user(&new_user("a@example.com")).await.unwrap();
        let other = repo.create_user(&new_user("b@example.com")).await.unwrap();
        let analysis = repo
            .insert_analysis(&new_analysis(Some(owner.id), "1 Main Street, Austin TX"))
            .await
            .unwrap();

        assert!(repo.get_analysis_for_user(analysis.id, owner.id).await.is_ok());
        let err = repo
            .get_analysis_for_user(analysis.id, other.id)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_insert_rejects_unknown_owner() {
        let repo = LocalRepository::new();
        let err = repo
            .insert_analysis(&new_analysis(Some(UserId(99)), "1 Main Street"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_over_address_and_notes() {
        let repo = LocalRepository::new();
        let user = repo.create_user(&new_user("a@example.com")).await.unwrap();
        repo.insert_analysis(&new_analysis(Some(user.id), "12 Ocean Drive, Miami FL"))
            .await
            .unwrap();
        repo.insert_analysis(&new_analysis(Some(user.id), "400 Congress Ave, Austin TX"))
            .await
            .unwrap();

        let page = PageRequest::new(1, 10);
        let miami = repo
            .list_user_analyses(user.id, Some("MIAMI"), page)
            .await
            .unwrap();
        assert_eq!(miami.total, 1);

        let roof = repo
            .list_user_analyses(user.id, Some("roof"), page)
            .await
            .unwrap();
        assert_eq!(roof.total, 2);
    }

    #[tokio::test]
    async fn test_delete_only_removes_owned_rows() {
        let repo = LocalRepository::new();
        let owner = repo.create_user(&new_user("a@example.com")).await.unwrap();
        let other = repo.create_user(&new_user("b@example.com")).await.unwrap();
        let analysis = repo
            .insert_analysis(&new_analysis(Some(owner.id), "1 Main Street"))
            .await
            .unwrap();

        assert!(!repo
            .delete_analysis_for_user(analysis.id, other.id)
            .await
            .unwrap());
        assert_eq!(repo.analysis_count(), 1);
        assert!(repo
            .delete_analysis_for_user(analysis.id, owner.id)
            .await
            .unwrap());
        assert_eq!(repo.analysis_count(), 0);
    }

    #[tokio::test]
    async fn test_list_events_filters_by_action() {
        let repo = LocalRepository::new();
        let user = repo.create_user(&new_user("a@example.com")).await.unwrap();
        repo.record_event(&NewAuditEvent::new(
            AuditAction::UserLogin,
            Some(user.id),
            json!({"email": user.email}),
        ))
        .await
        .unwrap();
        repo.record_event(&NewAuditEvent::new(
            AuditAction::AnalysisStarted,
            None,
            json!({}),
        ))
        .await
        .unwrap();

        let logins = repo
            .list_events(Some("user_login"), PageRequest::new(1, 50))
            .await
            .unwrap();
        assert_eq!(logins.total, 1);
        assert_eq!(logins.items[0].user.as_ref().unwrap().email, "a@example.com");

        let all = repo.list_events(None, PageRequest::new(1, 50)).await.unwrap();
        assert_eq!(all.total, 2);
        assert!(all.items[0].event.id > all.items[1].event.id);
    }

    #[tokio::test]
    async fn test_unhealthy_repository_fails_operations() {
        let repo = LocalRepository::new();
        repo.set_healthy(false);
        assert!(!repo.health_check().await.unwrap());
        let err = repo.create_user(&new_user("a@example.com")).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
