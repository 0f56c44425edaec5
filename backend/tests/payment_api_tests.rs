//! Plan catalog, checkout against a mocked Stripe, signed webhooks and the
//! subscription summary.

mod support;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reia::db::repository::UserRepository;
use reia::models::UserId;
use reia::services::billing::sign_webhook_payload;
use reia::services::{StripeClient, StripeConfig};
use support::{Script, TestApp};

const SECRET_KEY: &str = "sk_test_123";
const WEBHOOK_SECRET: &str = "whsec_test_456";

fn stripe_app(api_base: &str, webhook_secret: Option<&str>) -> TestApp {
    let client = StripeClient::new(StripeConfig {
        secret_key: SECRET_KEY.to_string(),
        webhook_secret: webhook_secret.map(str::to_string),
        api_base: api_base.to_string(),
    })
    .unwrap();
    TestApp::build(Script::Unconfigured, |_| {}, move |state| state.with_stripe(client))
}

fn webhook_request(payload: &Value, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/payment/webhook")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("stripe-signature", signature);
    }
    builder.body(Body::from(payload.to_string())).unwrap()
}

fn signed(payload: &Value) -> String {
    sign_webhook_payload(payload.to_string().as_bytes(), WEBHOOK_SECRET, Utc::now().timestamp())
}

#[tokio::test]
async fn test_plans_are_public() {
    let app = TestApp::new();
    let res = app.get("/api/payment/plans", None).await;
    assert_eq!(res.status, StatusCode::OK);
    let plans = res.body["plans"].as_array().unwrap();
    let ids: Vec<&str> = plans.iter().filter_map(|p| p["id"].as_str()).collect();
    assert_eq!(ids, ["starter", "pro", "enterprise"]);
    assert_eq!(plans[1]["price"], 29.99);
    assert_eq!(plans[1]["analysesPerMonth"], 100);
    assert_eq!(plans[2]["analysesPerMonth"], -1);
}

#[tokio::test]
async fn test_checkout_without_stripe_is_503() {
    let app = TestApp::new();
    let (_, token) = app.register("nostripe@example.com").await;
    let res = app
        .post(
            "/api/payment/create-checkout-session",
            Some(&token),
            json!({ "planId": "pro" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.body["error"], "Payments are not configured");
}

#[tokio::test]
async fn test_checkout_creates_customer_once_and_returns_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/customers"))
        .and(header("authorization", format!("Bearer {}", SECRET_KEY).as_str()))
        .and(body_string_contains("buyer%40example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "cus_abc" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .and(body_string_contains("customer=cus_abc"))
        .and(body_string_contains("unit_amount%5D=2999"))
        .and(body_string_contains("http%3A%2F%2Fapp.test%2Fdashboard"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_test_1",
            "url": "https://checkout.stripe.test/cs_test_1"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let app = stripe_app(&server.uri(), None);
    let (user_id, token) = app.register("buyer@example.com").await;

    for _ in 0..2 {
        let res = app
            .post(
                "/api/payment/create-checkout-session",
                Some(&token),
                json!({ "planId": "pro" }),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.body);
        assert_eq!(res.body["sessionId"], "cs_test_1");
        assert_eq!(res.body["url"], "https://checkout.stripe.test/cs_test_1");
    }

    let user = app.repo.get_user(UserId(user_id)).await.unwrap();
    assert_eq!(user.stripe_customer_id.as_deref(), Some("cus_abc"));
    assert!(app
        .repo
        .audit_events()
        .iter()
        .any(|e| e.action == "payment_session_created"));
}

#[tokio::test]
async fn test_checkout_rejects_unknown_plan() {
    let server = MockServer::start().await;
    let app = stripe_app(&server.uri(), None);
    let (_, token) = app.register("planless@example.com").await;

    let res = app
        .post(
            "/api/payment/create-checkout-session",
            Some(&token),
            json!({ "planId": "platinum" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"], "Invalid plan");
}

#[tokio::test]
async fn test_stripe_failure_is_audited_and_hidden() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/customers"))
        .respond_with(
            ResponseTemplate::new(402)
                .set_body_json(json!({ "error": { "message": "Your card was declined" } })),
        )
        .mount(&server)
        .await;

    let app = stripe_app(&server.uri(), None);
    let (_, token) = app.register("declined@example.com").await;
    let res = app
        .post(
            "/api/payment/create-checkout-session",
            Some(&token),
            json!({ "planId": "starter" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body["error"], "Internal server error");

    let error = app
        .repo
        .audit_events()
        .into_iter()
        .find(|e| e.action == "payment_error")
        .expect("payment_error recorded");
    let details = error.details.unwrap();
    assert!(details["error"].as_str().unwrap().contains("declined"));
}

#[tokio::test]
async fn test_webhook_checkout_completed_upgrades_subscription() {
    let server = MockServer::start().await;
    let app = stripe_app(&server.uri(), Some(WEBHOOK_SECRET));
    let (user_id, token) = app.register("upgrade@example.com").await;

    let payload = json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_live_1",
            "metadata": { "userId": user_id.to_string(), "planId": "pro" }
        }}
    });
    let res = app.send(webhook_request(&payload, Some(signed(&payload)))).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.body["received"], true);

    let status = app.get("/api/payment/subscription-status", Some(&token)).await;
    assert_eq!(status.body["subscription"]["status"], "pro");
    assert_eq!(status.body["subscription"]["plan"]["id"], "pro");
    assert_eq!(status.body["subscription"]["analysesRemaining"], 100);
    assert!(app
        .repo
        .audit_events()
        .iter()
        .any(|e| e.action == "payment_successful"));
}

#[tokio::test]
async fn test_webhook_subscription_deleted_downgrades_to_free() {
    let server = MockServer::start().await;
    let app = stripe_app(&server.uri(), Some(WEBHOOK_SECRET));
    let (user_id, _) = app.register("leaver@example.com").await;
    app.repo.set_stripe_customer_id(UserId(user_id), "cus_leaver").await.unwrap();
    app.repo.set_subscription_status(UserId(user_id), "starter").await.unwrap();

    let payload = json!({
        "id": "evt_2",
        "type": "customer.subscription.deleted",
        "data": { "object": { "id": "sub_1", "customer": "cus_leaver" } }
    });
    let res = app.send(webhook_request(&payload, Some(signed(&payload)))).await;
    assert_eq!(res.status, StatusCode::OK);

    let user = app.repo.get_user(UserId(user_id)).await.unwrap();
    assert_eq!(user.subscription_status, "free");
}

#[tokio::test]
async fn test_webhook_signature_checks() {
    let server = MockServer::start().await;
    let app = stripe_app(&server.uri(), Some(WEBHOOK_SECRET));
    let payload = json!({ "id": "evt_3", "type": "invoice.created", "data": { "object": {} } });

    let missing = app.send(webhook_request(&payload, None)).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);

    let forged = sign_webhook_payload(payload.to_string().as_bytes(), "whsec_other", Utc::now().timestamp());
    let bad = app.send(webhook_request(&payload, Some(forged))).await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    assert!(bad.body["error"].as_str().unwrap().starts_with("Webhook error"));

    let stale = sign_webhook_payload(
        payload.to_string().as_bytes(),
        WEBHOOK_SECRET,
        Utc::now().timestamp() - 3600,
    );
    let old = app.send(webhook_request(&payload, Some(stale))).await;
    assert_eq!(old.status, StatusCode::BAD_REQUEST);

    let ignored = app.send(webhook_request(&payload, Some(signed(&payload)))).await;
    assert_eq!(ignored.status, StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_without_secret_is_503() {
    let app = TestApp::new();
    let payload = json!({ "type": "checkout.session.completed" });
    let res = app.send(webhook_request(&payload, Some(signed(&payload)))).await;
    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_subscription_status_counts_this_month() {
    let app = TestApp::new();
    let (_, token) = app.register("free@example.com").await;
    app.analyze(Some(&token), "10 Downing Street, London", None).await;

    let res = app.get("/api/payment/subscription-status", Some(&token)).await;
    assert_eq!(res.status, StatusCode::OK);
    let sub = &res.body["subscription"];
    assert_eq!(sub["status"], "free");
    assert_eq!(sub["plan"]["id"], "free");
    assert_eq!(sub["analysesUsedThisMonth"], 1);
    assert_eq!(sub["analysesRemaining"], 2);
    assert_eq!(sub["hasStripeCustomer"], false);

    let anonymous = app.get("/api/payment/subscription-status", None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
}
