//! Shared helpers for integration tests: scoped environment changes, a
//! scriptable LLM provider and an in-process app driven through `oneshot`.
#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use reia::config::AppConfig;
use reia::db::repositories::LocalRepository;
use reia::http::{create_router, AppState};
use reia::llm::{Completion, CompletionProvider, CompletionRequest, LlmError};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// Restores the previous values on unwind and serializes access to the
/// process environment so parallel tests do not observe each other.
///
/// `Some(v)` sets a variable, `None` removes it.
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

// =============================================================================
// Scripted LLM provider
// =============================================================================

#[derive(Clone)]
pub enum Script {
    /// No usable key; the analyzer never calls `complete`.
    Unconfigured,
    Reply { text: String, tokens: i64 },
    Fail(fn() -> LlmError),
    Hang,
}

pub struct ScriptedProvider {
    script: Script,
}

impl ScriptedProvider {
    pub fn new(script: Script) -> Arc<dyn CompletionProvider> {
        Arc::new(Self { script })
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn is_configured(&self) -> bool {
        !matches!(self.script, Script::Unconfigured)
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, LlmError> {
        match &self.script {
            Script::Unconfigured => Err(LlmError::NotConfigured {
                provider: "scripted",
            }),
            Script::Reply { text, tokens } => Ok(Completion {
                text: text.clone(),
                tokens_used: *tokens,
                model: "scripted-1".to_string(),
            }),
            Script::Fail(make) => Err(make()),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(LlmError::EmptyResponse)
            }
        }
    }
}

// =============================================================================
// In-process application
// =============================================================================

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const PASSWORD: &str = "correct horse battery";

/// Settings every test app starts from.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::from_lookup(|key| match key {
        "JWT_SECRET" => Some("integration-test-secret".to_string()),
        "BCRYPT_COST" => Some("4".to_string()),
        "ADMIN_EMAILS" => Some(ADMIN_EMAIL.to_string()),
        "FRONTEND_URL" => Some("http://app.test".to_string()),
        _ => None,
    })
    .expect("test config");
    config.llm.timeout = Duration::from_millis(200);
    config
}

pub struct TestApp {
    pub router: Router,
    pub repo: LocalRepository,
    pub state: AppState,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestApp {
    /// App whose provider has no key, so analyses run in demo mode.
    pub fn new() -> Self {
        Self::with_script(Script::Unconfigured)
    }

    pub fn with_script(script: Script) -> Self {
        Self::build(script, |_| {}, |state| state)
    }

    pub fn build(
        script: Script,
        configure: impl FnOnce(&mut AppConfig),
        finish: impl FnOnce(AppState) -> AppState,
    ) -> Self {
        let mut config = test_config();
        configure(&mut config);
        let repo = LocalRepository::new();
        let state = finish(AppState::new(
            Arc::new(repo.clone()),
            ScriptedProvider::new(script),
            config,
        ));
        Self {
            router: create_router(state.clone()),
            repo,
            state,
        }
    }

    /// Peer address attached to requests that do not carry one.
    pub const PEER: &'static str = "192.0.2.10:40000";

    pub async fn send(&self, mut request: Request<Body>) -> TestResponse {
        if request.extensions().get::<ConnectInfo<SocketAddr>>().is_none() {
            let peer: SocketAddr = Self::PEER.parse().expect("peer address");
            request.extensions_mut().insert(ConnectInfo(peer));
        }
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn call(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("valid request");
        self.send(request).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.call(Method::GET, path, token, None).await
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.call(Method::POST, path, token, Some(body)).await
    }

    pub async fn patch(&self, path: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.call(Method::PATCH, path, token, Some(body)).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.call(Method::DELETE, path, token, None).await
    }

    /// Register `email` and return `(user id, token)`.
    pub async fn register(&self, email: &str) -> (i64, String) {
        let res = self
            .post(
                "/api/auth/register",
                None,
                serde_json::json!({ "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "register failed: {}", res.body);
        let id = res.body["user"]["id"].as_i64().expect("user id");
        let token = res.body["token"].as_str().expect("token").to_string();
        (id, token)
    }

    /// Submit an analysis and return its id.
    pub async fn analyze(&self, token: Option<&str>, address: &str, notes: Option<&str>) -> i64 {
        let res = self
            .post(
                "/api/analysis",
                token,
                serde_json::json!({ "propertyAddress": address, "acquisitionNotes": notes }),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "analysis failed: {}", res.body);
        res.body["analysis"]["id"].as_i64().expect("analysis id")
    }
}
