//! Registration, login, token verification and logout over HTTP.

mod support;

use axum::http::StatusCode;
use serde_json::json;

use reia::db::repository::UserRepository;
use reia::models::UserId;
use support::{TestApp, ADMIN_EMAIL, PASSWORD};

#[tokio::test]
async fn test_register_creates_account_and_returns_token() {
    let app = TestApp::new();
    let res = app
        .post(
            "/api/auth/register",
            None,
            json!({
                "email": "  Ada@Example.com ",
                "password": PASSWORD,
                "firstName": "Ada",
                "lastName": "Lovelace"
            }),
        )
        .await;

    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.body["success"], true);
    assert_eq!(res.body["message"], "Account created successfully");
    assert_eq!(res.body["user"]["email"], "ada@example.com");
    assert_eq!(res.body["user"]["firstName"], "Ada");
    assert_eq!(res.body["user"]["role"], "user");
    assert_eq!(res.body["user"]["subscriptionStatus"], "free");
    assert!(res.body["user"].get("passwordHash").is_none());
    assert!(res.body["token"].as_str().is_some_and(|t| !t.is_empty()));

    let stored = app
        .repo
        .find_user_by_email("ada@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_ne!(stored.password_hash, PASSWORD);
    assert!(stored.password_hash.starts_with("$2"));
}

#[tokio::test]
async fn test_register_duplicate_email_is_conflict() {
    let app = TestApp::new();
    app.register("dup@example.com").await;

    let res = app
        .post(
            "/api/auth/register",
            None,
            json!({ "email": "DUP@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.body["success"], false);
    assert_eq!(res.body["error"], "An account with this email already exists");
}

#[tokio::test]
async fn test_register_validation_reports_every_problem() {
    let app = TestApp::new();
    let res = app
        .post(
            "/api/auth/register",
            None,
            json!({ "email": "not-an-email", "password": "short", "firstName": "A" }),
        )
        .await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["code"], "VALIDATION_ERROR");
    let details: Vec<&str> = res.body["details"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|d| d.as_str())
        .collect();
    assert!(details.contains(&"Invalid email address"));
    assert!(details.contains(&"Password must be at least 8 characters"));
    assert!(details.iter().any(|d| d.starts_with("First name")));
}

#[tokio::test]
async fn test_register_malformed_json_is_bad_request() {
    let app = TestApp::new();
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/auth/register")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let res = app.send(request).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_admin_email_registers_with_admin_role() {
    let app = TestApp::new();
    let res = app
        .post(
            "/api/auth/register",
            None,
            json!({ "email": ADMIN_EMAIL.to_uppercase(), "password": PASSWORD }),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.body["user"]["role"], "admin");
}

#[tokio::test]
async fn test_login_success_and_failures() {
    let app = TestApp::new();
    app.register("login@example.com").await;

    let ok = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "LOGIN@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body["message"], "Login successful");
    assert_eq!(ok.body["user"]["email"], "login@example.com");

    let wrong = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "login@example.com", "password": "wrong password" }),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.body["error"], "Invalid email or password");

    let unknown = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "ghost@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.body["error"], wrong.body["error"]);

    let missing = app
        .post("/api/auth/login", None, json!({ "email": "login@example.com" }))
        .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_deactivated_account_cannot_login_or_use_token() {
    let app = TestApp::new();
    let (id, token) = app.register("gone@example.com").await;
    app.repo.set_user_active(UserId(id), false).await.unwrap();

    let login = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "gone@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(login.status, StatusCode::UNAUTHORIZED);
    assert_eq!(login.body["error"], "Account is disabled. Contact support.");

    let verify = app.get("/api/auth/verify", Some(&token)).await;
    assert_eq!(verify.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_verify_token() {
    let app = TestApp::new();
    let (id, token) = app.register("verify@example.com").await;

    let ok = app.get("/api/auth/verify", Some(&token)).await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body["message"], "Token is valid");
    assert_eq!(ok.body["user"]["id"], id);

    let none = app.get("/api/auth/verify", None).await;
    assert_eq!(none.status, StatusCode::UNAUTHORIZED);
    assert_eq!(none.body["error"], "Access token required");

    let garbage = app.get("/api/auth/verify", Some("not.a.jwt")).await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);
    assert_eq!(garbage.body["error"], "Invalid token");
}

#[tokio::test]
async fn test_token_for_deleted_user_is_rejected() {
    let app = TestApp::new();
    let token = app.state.tokens.issue(UserId(4242)).unwrap();
    let res = app.get("/api/auth/verify", Some(&token)).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["error"], "User not found");
}

#[tokio::test]
async fn test_auth_flow_is_audited() {
    let app = TestApp::new();
    let (id, token) = app.register("audit@example.com").await;
    app.post(
        "/api/auth/login",
        None,
        json!({ "email": "audit@example.com", "password": PASSWORD }),
    )
    .await;

    let res = app.post("/api/auth/logout", Some(&token), json!({})).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["message"], "Logged out successfully");

    let actions: Vec<String> = app
        .repo
        .audit_events()
        .into_iter()
        .filter(|e| e.user_id == Some(UserId(id)))
        .map(|e| e.action)
        .collect();
    for expected in ["user_registered", "user_login", "user_logout"] {
        assert!(actions.iter().any(|a| a == expected), "missing {expected}");
    }
}

#[tokio::test]
async fn test_health_and_unknown_routes() {
    let app = TestApp::new();
    let health = app.get("/health", None).await;
    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(health.body["status"], "ok");
    assert_eq!(health.body["database"], "connected");

    let missing = app.get("/api/nope", None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.body["path"], "/api/nope");

    app.repo.set_healthy(false);
    let degraded = app.get("/health", None).await;
    assert_eq!(degraded.status, StatusCode::OK);
    assert_eq!(degraded.body["database"], "disconnected");
}
