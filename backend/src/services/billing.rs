//! Subscription plans and the Stripe integration.
//!
//! Stripe is optional: without `STRIPE_SECRET_KEY` the plan catalog is still
//! served but checkout and webhooks answer 503.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::repository::{FullRepository, RepositoryError};
use crate::models::{AuditAction, NewAuditEvent, User, UserId, DEFAULT_SUBSCRIPTION_STATUS};

pub const STRIPE_DEFAULT_BASE: &str = "https://api.stripe.com";
/// Maximum age of a webhook signature timestamp.
pub const WEBHOOK_TOLERANCE_SECS: u64 = 300;
/// Monthly allowance for accounts without a paid plan.
pub const FREE_MONTHLY_ANALYSES: i64 = 3;
/// `analyses_per_month` value meaning "no limit".
pub const UNLIMITED: i64 = -1;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Payments are not configured")]
    NotConfigured,

    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Malformed webhook event: {0}")]
    MalformedEvent(String),

    #[error("Stripe returned {status}: {message}")]
    Stripe { status: u16, message: String },

    #[error("Stripe transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: &'static str,
    pub name: &'static str,
    pub price: f64,
    pub currency: &'static str,
    pub interval: &'static str,
    pub analyses_per_month: i64,
    pub features: &'static [&'static str],
}

impl Plan {
    pub fn unit_amount_cents(&self) -> i64 {
        (self.price * 100.0).round() as i64
    }

    pub fn is_unlimited(&self) -> bool {
        self.analyses_per_month == UNLIMITED
    }
}

static PLANS: [Plan; 3] = [
    Plan {
        id: "starter",
        name: "Starter",
        price: 9.99,
        currency: "eur",
        interval: "month",
        analyses_per_month: 10,
        features: &["Standard analyses", "Limited history", "Email support"],
    },
    Plan {
        id: "pro",
        name: "Pro",
        price: 29.99,
        currency: "eur",
        interval: "month",
        analyses_per_month: 100,
        features: &[
            "Detailed analyses",
            "Full history",
            "Investment analyses",
            "Priority support",
        ],
    },
    Plan {
        id: "enterprise",
        name: "Enterprise",
        price: 99.99,
        currency: "eur",
        interval: "month",
        analyses_per_month: UNLIMITED,
        features: &[
            "Unlimited analyses",
            "API access",
            "Dedicated support",
            "Custom reports",
        ],
    },
];

static FREE_PLAN: Plan = Plan {
    id: "free",
    name: "Free",
    price: 0.0,
    currency: "eur",
    interval: "month",
    analyses_per_month: FREE_MONTHLY_ANALYSES,
    features: &["3 analyses per month", "Community support"],
};

/// Paid plans, cheapest first.
pub fn plans() -> &'static [Plan] {
    &PLANS
}

pub fn find_plan(id: &str) -> Option<&'static Plan> {
    PLANS.iter().find(|p| p.id == id)
}

/// Plan for a stored subscription status; unknown values count as free.
pub fn plan_for_status(status: &str) -> &'static Plan {
    find_plan(status).unwrap_or(&FREE_PLAN)
}

/// Midnight UTC on the first day of `now`'s month.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    pub status: String,
    pub plan: &'static Plan,
    pub analyses_used_this_month: u64,
    /// `-1` when the plan is unlimited.
    pub analyses_remaining: i64,
    pub has_stripe_customer: bool,
}

pub fn subscription_summary(user: &User, used_this_month: u64) -> SubscriptionSummary {
    let plan = plan_for_status(&user.subscription_status);
    let analyses_remaining = if plan.is_unlimited() {
        UNLIMITED
    } else {
        (plan.analyses_per_month - used_this_month as i64).max(0)
    };
    SubscriptionSummary {
        status: user.subscription_status.clone(),
        plan,
        analyses_used_this_month: used_this_month,
        analyses_remaining,
        has_stripe_customer: user.stripe_customer_id.is_some(),
    }
}

// ==================== Stripe REST client ====================

#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: Option<String>,
    pub api_base: String,
}

impl StripeConfig {
    /// `None` unless `STRIPE_SECRET_KEY` is set.
    pub fn from_env() -> Option<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())?;
        Some(Self {
            secret_key,
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            api_base: std::env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| STRIPE_DEFAULT_BASE.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeObject {
    id: String,
}

#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Result<Self, BillingError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .map_err(|e| BillingError::Transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.config.webhook_secret.as_deref()
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, BillingError> {
        let url = format!("{}{}", self.config.api_base.trim_end_matches('/'), path);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.secret_key)
            .form(form)
            .send()
            .await
            .map_err(|e| BillingError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(body);
            return Err(BillingError::Stripe {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BillingError::Transport(e.to_string()))
    }

    /// Create a customer and return its id.
    pub async fn create_customer(&self, user: &User) -> Result<String, BillingError> {
        let form = vec![
            ("email".to_string(), user.email.clone()),
            ("name".to_string(), user.display_name()),
            ("metadata[userId]".to_string(), user.id.to_string()),
        ];
        let customer: StripeObject = self.post_form("/v1/customers", &form).await?;
        Ok(customer.id)
    }

    /// Create a subscription checkout session for `plan`.
    pub async fn create_checkout_session(
        &self,
        customer_id: &str,
        user_id: UserId,
        plan: &Plan,
        frontend_url: &str,
    ) -> Result<CheckoutSession, BillingError> {
        let frontend_url = frontend_url.trim_end_matches('/');
        let description = if plan.is_unlimited() {
            "Unlimited analyses per month".to_string()
        } else {
            format!("{} analyses per month", plan.analyses_per_month)
        };
        let item = "line_items[0]";
        let form = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("mode".to_string(), "subscription".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            (format!("{item}[price_data][currency]"), plan.currency.to_string()),
            (format!("{item}[price_data][product_data][name]"), plan.name.to_string()),
            (format!("{item}[price_data][product_data][description]"), description),
            (format!("{item}[price_data][unit_amount]"), plan.unit_amount_cents().to_string()),
            (format!("{item}[price_data][recurring][interval]"), plan.interval.to_string()),
            (format!("{item}[quantity]"), "1".to_string()),
            (
                "success_url".to_string(),
                format!("{frontend_url}/dashboard?payment=success&session_id={{CHECKOUT_SESSION_ID}}"),
            ),
            (
                "cancel_url".to_string(),
                format!("{frontend_url}/pricing?payment=cancelled"),
            ),
            ("metadata[userId]".to_string(), user_id.to_string()),
            ("metadata[planId]".to_string(), plan.id.to_string()),
        ];
        self.post_form("/v1/checkout/sessions", &form).await
    }
}

// ==================== Webhooks ====================

type HmacSha256 = Hmac<Sha256>;

/// Check a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`).
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), BillingError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", t)) => timestamp = t.parse().ok(),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| BillingError::InvalidSignature("missing timestamp".into()))?;
    if signatures.is_empty() {
        return Err(BillingError::InvalidSignature("missing v1 signature".into()));
    }
    if now.abs_diff(timestamp) > WEBHOOK_TOLERANCE_SECS {
        return Err(BillingError::InvalidSignature(
            "timestamp outside tolerance".into(),
        ));
    }

    let matches = signatures.iter().any(|sig| {
        let Ok(expected) = hex::decode(sig) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    });

    if matches {
        Ok(())
    } else {
        Err(BillingError::InvalidSignature("no matching signature".into()))
    }
}

/// Signature header value for `payload`, as Stripe would send it.
pub fn sign_webhook_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: Value,
}

/// The webhook events this service reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum StripeEvent {
    CheckoutCompleted {
        session_id: String,
        user_id: UserId,
        plan_id: String,
    },
    InvoicePaid {
        invoice_id: String,
        customer_id: String,
        amount_paid_cents: i64,
    },
    SubscriptionDeleted {
        subscription_id: String,
        customer_id: String,
    },
    Ignored(String),
}

fn str_field<'a>(object: &'a Value, pointer: &str) -> Result<&'a str, BillingError> {
    object
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| BillingError::MalformedEvent(format!("missing {}", pointer)))
}

pub fn parse_event(payload: &[u8]) -> Result<StripeEvent, BillingError> {
    let raw: RawEvent =
        serde_json::from_slice(payload).map_err(|e| BillingError::MalformedEvent(e.to_string()))?;
    let object = &raw.data.object;

    Ok(match raw.kind.as_str() {
        "checkout.session.completed" => StripeEvent::CheckoutCompleted {
            session_id: str_field(object, "/id")?.to_string(),
            user_id: str_field(object, "/metadata/userId")?
                .parse()
                .map_err(|_| BillingError::MalformedEvent("metadata.userId is not an id".into()))?,
            plan_id: str_field(object, "/metadata/planId")?.to_string(),
        },
        "invoice.payment_succeeded" => StripeEvent::InvoicePaid {
            invoice_id: str_field(object, "/id")?.to_string(),
            customer_id: str_field(object, "/customer")?.to_string(),
            amount_paid_cents: object
                .get("amount_paid")
                .and_then(Value::as_i64)
                .unwrap_or(0),
        },
        "customer.subscription.deleted" => StripeEvent::SubscriptionDeleted {
            subscription_id: str_field(object, "/id")?.to_string(),
            customer_id: str_field(object, "/customer")?.to_string(),
        },
        other => StripeEvent::Ignored(other.to_string()),
    })
}

/// Apply a verified webhook event to the account data.
pub async fn apply_event(
    repository: &dyn FullRepository,
    event: StripeEvent,
) -> Result<(), BillingError> {
    match event {
        StripeEvent::CheckoutCompleted {
            session_id,
            user_id,
            plan_id,
        } => {
            let Some(plan) = find_plan(&plan_id) else {
                warn!(plan_id = %plan_id, "Checkout completed for unknown plan");
                return Ok(());
            };
            repository.set_subscription_status(user_id, plan.id).await?;
            repository
                .record_event(&NewAuditEvent::new(
                    AuditAction::PaymentSuccessful,
                    Some(user_id),
                    json!({ "planId": plan.id, "sessionId": session_id, "amount": plan.price }),
                ))
                .await?;
            info!(user_id = %user_id, plan = plan.id, "Subscription activated");
        }
        StripeEvent::InvoicePaid {
            invoice_id,
            customer_id,
            amount_paid_cents,
        } => {
            if let Some(user) = repository.find_user_by_stripe_customer(&customer_id).await? {
                repository
                    .record_event(&NewAuditEvent::new(
                        AuditAction::SubscriptionRenewed,
                        Some(user.id),
                        json!({ "invoiceId": invoice_id, "amount": amount_paid_cents as f64 / 100.0 }),
                    ))
                    .await?;
                info!(user_id = %user.id, "Subscription renewed");
            }
        }
        StripeEvent::SubscriptionDeleted {
            subscription_id,
            customer_id,
        } => {
            if let Some(user) = repository.find_user_by_stripe_customer(&customer_id).await? {
                repository
                    .set_subscription_status(user.id, DEFAULT_SUBSCRIPTION_STATUS)
                    .await?;
                repository
                    .record_event(&NewAuditEvent::new(
                        AuditAction::SubscriptionCancelled,
                        Some(user.id),
                        json!({ "subscriptionId": subscription_id }),
                    ))
                    .await?;
                info!(user_id = %user.id, "Subscription cancelled");
            }
        }
        StripeEvent::Ignored(kind) => {
            info!(event_type = %kind, "Ignoring unhandled Stripe event");
        }
    }
    Ok(())
}
