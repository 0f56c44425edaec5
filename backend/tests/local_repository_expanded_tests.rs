//! Expanded tests for LocalRepository.
//!
//! Concurrent access, pagination boundaries, aggregates and the lookups the
//! payment flow relies on.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use reia::db::models::{AnalysisFilter, PageRequest, UserFilter};
use reia::db::repositories::LocalRepository;
use reia::db::repository::{AnalysisRepository, AuditRepository, UserRepository};
use reia::models::{
    AnalysisType, AuditAction, NewAnalysis, NewAuditEvent, NewUser, UserId, UserRole,
};

fn new_user(email: &str, first: Option<&str>, last: Option<&str>) -> NewUser {
    NewUser {
        email: email.to_string(),
        password_hash: "$2b$04$hash".to_string(),
        first_name: first.map(str::to_string),
        last_name: last.map(str::to_string),
        role: UserRole::User,
    }
}

fn new_analysis(user_id: Option<UserId>, address: &str, kind: AnalysisType, tokens: i64) -> NewAnalysis {
    NewAnalysis {
        user_id,
        property_address: address.to_string(),
        acquisition_notes: None,
        ai_analysis: format!("## Report for {}", address),
        analysis_type: kind,
        tokens_used: tokens,
    }
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test]
async fn test_concurrent_inserts_get_unique_ids() {
    let repo = Arc::new(LocalRepository::new());
    let owner = repo
        .create_user(&new_user("owner@example.com", None, None))
        .await
        .unwrap();
    let owner_id = owner.id;

    let mut handles = Vec::new();
    for i in 0..20 {
        let repo = Arc::clone(&repo);
        handles.push(tokio::spawn(async move {
            repo.insert_analysis(&new_analysis(
                Some(owner_id),
                &format!("{} Main St", i),
                AnalysisType::Standard,
                10,
            ))
            .await
            .unwrap()
            .id
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 20);
    assert_eq!(repo.analysis_count(), 20);
}

#[tokio::test]
async fn test_concurrent_registration_of_same_email_admits_one() {
    let repo = Arc::new(LocalRepository::new());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let repo = Arc::clone(&repo);
        handles.push(tokio::spawn(async move {
            repo.create_user(&new_user("race@example.com", None, None)).await
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(e) if e.is_conflict() => conflicts += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!((created, conflicts), (1, 7));
}

// =========================================================================
// Pagination
// =========================================================================

#[tokio::test]
async fn test_user_history_pages_are_newest_first_and_disjoint() {
    let repo = LocalRepository::new();
    let user = repo
        .create_user(&new_user("pages@example.com", None, None))
        .await
        .unwrap();

    let now = Utc::now();
    for i in 0..25 {
        let a = repo
            .insert_analysis(&new_analysis(
                Some(user.id),
                &format!("{} Elm St", i),
                AnalysisType::Standard,
                1,
            ))
            .await
            .unwrap();
        repo.backdate_analysis(a.id, now - Duration::minutes(25 - i));
    }

    let first = repo
        .list_user_analyses(user.id, None, PageRequest::new(1, 10))
        .await
        .unwrap();
    let third = repo
        .list_user_analyses(user.id, None, PageRequest::new(3, 10))
        .await
        .unwrap();
    let beyond = repo
        .list_user_analyses(user.id, None, PageRequest::new(4, 10))
        .await
        .unwrap();

    assert_eq!(first.total, 25);
    assert_eq!(first.items.len(), 10);
    assert_eq!(first.items[0].property_address, "24 Elm St");
    assert_eq!(third.items.len(), 5);
    assert_eq!(third.items[4].property_address, "0 Elm St");
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total, 25);
}

#[tokio::test]
async fn test_other_users_rows_never_leak_into_history() {
    let repo = LocalRepository::new();
    let alice = repo.create_user(&new_user("alice@example.com", None, None)).await.unwrap();
    let bob = repo.create_user(&new_user("bob@example.com", None, None)).await.unwrap();

    repo.insert_analysis(&new_analysis(Some(alice.id), "1 Oak Ave", AnalysisType::Standard, 5))
        .await
        .unwrap();
    repo.insert_analysis(&new_analysis(None, "2 Oak Ave", AnalysisType::Standard, 5))
        .await
        .unwrap();

    let page = repo
        .list_user_analyses(bob.id, Some("oak"), PageRequest::new(1, 10))
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

// =========================================================================
// Aggregates
// =========================================================================

#[tokio::test]
async fn test_user_stats_counts_types_and_recent_window() {
    let repo = LocalRepository::new();
    let user = repo.create_user(&new_user("stats@example.com", None, None)).await.unwrap();
    let now = Utc::now();

    let old = repo
        .insert_analysis(&new_analysis(Some(user.id), "Old Rd", AnalysisType::Investment, 300))
        .await
        .unwrap();
    repo.backdate_analysis(old.id, now - Duration::days(45));
    repo.insert_analysis(&new_analysis(Some(user.id), "New Rd", AnalysisType::Standard, 200))
        .await
        .unwrap();
    repo.insert_analysis(&new_analysis(Some(user.id), "Newer Rd", AnalysisType::Standard, 100))
        .await
        .unwrap();

    let stats = repo
        .user_analysis_stats(user.id, now - Duration::days(30))
        .await
        .unwrap();
    assert_eq!(stats.total_analyses, 3);
    assert_eq!(stats.total_tokens, 600);
    assert_eq!(stats.recent_analyses, 2);
    assert_eq!(stats.by_type.get("standard"), Some(&2));
    assert_eq!(stats.by_type.get("investment"), Some(&1));
    assert_eq!(stats.first_analysis, Some(now - Duration::days(45)));

    let since_month = repo
        .count_user_analyses_since(user.id, now - Duration::days(30))
        .await
        .unwrap();
    assert_eq!(since_month, 2);
}

#[tokio::test]
async fn test_platform_stats_rank_users_and_bucket_recent_days() {
    let repo = LocalRepository::new();
    let now = Utc::now();
    let heavy = repo.create_user(&new_user("heavy@example.com", Some("Hal"), None)).await.unwrap();
    let light = repo.create_user(&new_user("light@example.com", None, None)).await.unwrap();
    let idle = repo.create_user(&new_user("idle@example.com", None, None)).await.unwrap();
    repo.backdate_user(idle.id, now - Duration::days(90));
    repo.set_user_active(idle.id, false).await.unwrap();

    for _ in 0..3 {
        repo.insert_analysis(&new_analysis(Some(heavy.id), "H St", AnalysisType::Standard, 100))
            .await
            .unwrap();
    }
    repo.insert_analysis(&new_analysis(Some(light.id), "L St", AnalysisType::Detailed, 50))
        .await
        .unwrap();
    let stale = repo
        .insert_analysis(&new_analysis(None, "Anon St", AnalysisType::Standard, 50))
        .await
        .unwrap();
    repo.backdate_analysis(stale.id, now - Duration::days(10));

    let stats = repo.platform_stats(now).await.unwrap();
    assert_eq!(stats.total_users, 3);
    assert_eq!(stats.new_users_last_30_days, 2);
    assert_eq!(stats.active_users, 2);
    assert_eq!(stats.total_analyses, 5);
    assert_eq!(stats.analyses_last_30_days, 5);
    assert_eq!(stats.total_tokens, 400);
    assert!((stats.avg_tokens_per_analysis - 80.0).abs() < f64::EPSILON);
    assert_eq!(stats.by_type["standard"].count, 4);
    assert_eq!(stats.by_type["detailed"].tokens, 50);

    assert_eq!(stats.top_users[0].email, "heavy@example.com");
    assert_eq!(stats.top_users[0].total_analyses, 3);
    assert_eq!(stats.top_users[1].email, "light@example.com");

    let bucketed: u64 = stats.daily_usage.iter().map(|d| d.analyses).sum();
    assert_eq!(bucketed, 4, "the 10-day-old analysis is outside the 7-day window");
}

#[tokio::test]
async fn test_admin_lists_filter_and_attach_owner() {
    let repo = LocalRepository::new();
    let owner = repo
        .create_user(&new_user("owner@example.com", Some("Olive"), Some("Owens")))
        .await
        .unwrap();
    repo.insert_analysis(&new_analysis(Some(owner.id), "A St", AnalysisType::Investment, 10))
        .await
        .unwrap();
    repo.insert_analysis(&new_analysis(None, "B St", AnalysisType::Investment, 10))
        .await
        .unwrap();
    repo.insert_analysis(&new_analysis(Some(owner.id), "C St", AnalysisType::Standard, 10))
        .await
        .unwrap();

    let investment = repo
        .list_all_analyses(
            &AnalysisFilter {
                analysis_type: Some(AnalysisType::Investment),
                user_id: None,
            },
            PageRequest::new(1, 20),
        )
        .await
        .unwrap();
    assert_eq!(investment.total, 2);
    let anonymous = investment
        .items
        .iter()
        .find(|row| row.summary.property_address == "B St")
        .unwrap();
    assert!(anonymous.owner.is_none());
    let owned = investment
        .items
        .iter()
        .find(|row| row.summary.property_address == "A St")
        .unwrap();
    assert_eq!(owned.owner.as_ref().unwrap().name, "Olive Owens");

    let by_owner = repo
        .list_all_analyses(
            &AnalysisFilter {
                analysis_type: None,
                user_id: Some(owner.id),
            },
            PageRequest::new(1, 20),
        )
        .await
        .unwrap();
    assert_eq!(by_owner.total, 2);

    let users = repo
        .list_users(
            &UserFilter {
                search: Some("OWENS".to_string()),
            },
            PageRequest::new(1, 20),
        )
        .await
        .unwrap();
    assert_eq!(users.total, 1);
    assert_eq!(users.items[0].total_analyses, 2);
    assert_eq!(users.items[0].total_tokens, 20);
    assert!(users.items[0].last_analysis.is_some());
}

// =========================================================================
// Billing lookups and audit
// =========================================================================

#[tokio::test]
async fn test_stripe_customer_lookup_and_subscription_update() {
    let repo = LocalRepository::new();
    let user = repo.create_user(&new_user("payer@example.com", None, None)).await.unwrap();
    assert_eq!(user.subscription_status, "free");

    repo.set_stripe_customer_id(user.id, "cus_123").await.unwrap();
    repo.set_subscription_status(user.id, "pro").await.unwrap();

    let found = repo.find_user_by_stripe_customer("cus_123").await.unwrap().unwrap();
    assert_eq!(found.id, user.id);
    assert_eq!(found.subscription_status, "pro");
    assert!(repo.find_user_by_stripe_customer("cus_other").await.unwrap().is_none());

    let missing = repo.set_subscription_status(UserId(999), "pro").await;
    assert!(missing.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_audit_entries_resolve_owner_and_page_newest_first() {
    let repo = LocalRepository::new();
    let user = repo.create_user(&new_user("audited@example.com", None, None)).await.unwrap();

    for i in 0..3 {
        repo.record_event(&NewAuditEvent::new(
            AuditAction::AnalysisCompleted,
            Some(user.id),
            json!({ "seq": i }),
        ))
        .await
        .unwrap();
    }
    repo.record_event(&NewAuditEvent::new(AuditAction::UserLogin, None, json!({})))
        .await
        .unwrap();

    let page = repo
        .list_events(Some("analysis_completed"), PageRequest::new(1, 2))
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].event.details, Some(json!({ "seq": 2 })));
    assert_eq!(page.items[0].user.as_ref().unwrap().email, "audited@example.com");

    let all = repo.list_events(None, PageRequest::new(1, 20)).await.unwrap();
    assert_eq!(all.total, 4);
}
