//! `/api/payment/*`: plan catalog, Stripe checkout, webhooks and the
//! subscription summary.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde_json::json;
use tracing::{error, info};

use super::{record_audit, HandlerResult};
use crate::http::dto::{
    CheckoutRequest, CheckoutResponse, PlansResponse, SubscriptionResponse, WebhookAck,
};
use crate::http::error::AppError;
use crate::http::extract::{AuthUser, JsonBody};
use crate::http::state::AppState;
use crate::models::{AuditAction, User};
use crate::services::billing::{self, BillingError, CheckoutSession, Plan, StripeClient};

/// GET /api/payment/plans
pub async fn plans() -> Json<PlansResponse> {
    Json(PlansResponse {
        success: true,
        plans: billing::plans(),
    })
}

async fn start_checkout(
    state: &AppState,
    stripe: &StripeClient,
    user: &User,
    plan: &Plan,
) -> Result<CheckoutSession, BillingError> {
    let customer_id = match &user.stripe_customer_id {
        Some(id) => id.clone(),
        None => {
            let id = stripe.create_customer(user).await?;
            state.repository.set_stripe_customer_id(user.id, &id).await?;
            id
        }
    };
    stripe
        .create_checkout_session(&customer_id, user.id, plan, &state.config.frontend_url)
        .await
}

/// POST /api/payment/create-checkout-session
pub async fn create_checkout_session(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<CheckoutRequest>,
) -> HandlerResult<CheckoutResponse> {
    let stripe = state.stripe.clone().ok_or(BillingError::NotConfigured)?;
    let plan_id = body.plan_id.unwrap_or_default();
    let plan = billing::find_plan(plan_id.trim())
        .ok_or_else(|| BillingError::UnknownPlan(plan_id.clone()))?;

    match start_checkout(&state, &stripe, &user, plan).await {
        Ok(session) => {
            record_audit(
                &state,
                AuditAction::PaymentSessionCreated,
                Some(user.id),
                json!({ "planId": plan.id, "sessionId": session.id }),
            )
            .await;
            info!(user_id = %user.id, plan = plan.id, "Checkout session created");
            Ok(Json(CheckoutResponse {
                success: true,
                session_id: session.id,
                url: session.url,
            }))
        }
        Err(e) => {
            error!(user_id = %user.id, error = %e, "Checkout session failed");
            record_audit(
                &state,
                AuditAction::PaymentError,
                Some(user.id),
                json!({ "planId": plan.id, "error": e.to_string() }),
            )
            .await;
            Err(e.into())
        }
    }
}

/// POST /api/payment/webhook
///
/// The raw body is needed for signature verification, so it is taken as
/// bytes rather than JSON.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> HandlerResult<WebhookAck> {
    let secret = state
        .stripe
        .as_ref()
        .and_then(|s| s.webhook_secret())
        .ok_or(BillingError::NotConfigured)?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing Stripe-Signature header".to_string()))?;

    billing::verify_webhook_signature(&body, signature, secret, Utc::now().timestamp())?;
    let event = billing::parse_event(&body)?;
    billing::apply_event(state.repository.as_ref(), event).await?;

    Ok(Json(WebhookAck { received: true }))
}

/// GET /api/payment/subscription-status
pub async fn subscription_status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> HandlerResult<SubscriptionResponse> {
    let since = billing::month_start(Utc::now());
    let used = state
        .repository
        .count_user_analyses_since(user.id, since)
        .await?;

    Ok(Json(SubscriptionResponse {
        success: true,
        subscription: billing::subscription_summary(&user, used),
    }))
}
