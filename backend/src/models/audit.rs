use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::user::UserId;

crate::define_id_type!(i64, AuditEventId);

/// Actions recorded in the `analytics` audit table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    UserRegistered,
    UserLogin,
    UserLogout,
    AnalysisStarted,
    AnalysisCompleted,
    AnalysisError,
    AnalysisDeleted,
    AdminUserStatusChanged,
    PaymentSessionCreated,
    PaymentSuccessful,
    SubscriptionRenewed,
    SubscriptionCancelled,
    PaymentError,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::UserRegistered => "user_registered",
            AuditAction::UserLogin => "user_login",
            AuditAction::UserLogout => "user_logout",
            AuditAction::AnalysisStarted => "analysis_started",
            AuditAction::AnalysisCompleted => "analysis_completed",
            AuditAction::AnalysisError => "analysis_error",
            AuditAction::AnalysisDeleted => "analysis_deleted",
            AuditAction::AdminUserStatusChanged => "admin_user_status_changed",
            AuditAction::PaymentSessionCreated => "payment_session_created",
            AuditAction::PaymentSuccessful => "payment_successful",
            AuditAction::SubscriptionRenewed => "subscription_renewed",
            AuditAction::SubscriptionCancelled => "subscription_cancelled",
            AuditAction::PaymentError => "payment_error",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_string()))
            .map_err(|_| format!("Unknown audit action: {}", s))
    }
}

/// A stored audit row.
///
/// `action` stays a plain string so rows written by older deployments still load.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub id: AuditEventId,
    pub user_id: Option<UserId>,
    pub action: String,
    pub details: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for an audit row.
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub user_id: Option<UserId>,
    pub action: AuditAction,
    pub details: Value,
}

impl NewAuditEvent {
    pub fn new(action: AuditAction, user_id: Option<UserId>, details: Value) -> Self {
        Self {
            user_id,
            action,
            details,
        }
    }
}
