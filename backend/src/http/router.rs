//! Router configuration for the HTTP API.
//!
//! This module sets up all routes, middleware (CORS, compression, tracing,
//! rate limiting) and creates the axum router ready for serving.

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use super::handlers::{self, admin, analysis, auth, payment, user};
use super::rate_limit;
use super::state::AppState;

/// Request bodies above this size are rejected.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o.trim_end_matches('/')) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Create the main application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    let global_limit = state.config.global_rate_limit;
    let analysis_limit = state.config.analysis_rate_limit;

    let global_governor = GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .period(rate_limit::replenish_period(global_limit))
        .burst_size(rate_limit::burst_size(global_limit))
        .finish();
    let analysis_governor = GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .period(rate_limit::replenish_period(analysis_limit))
        .burst_size(rate_limit::burst_size(analysis_limit))
        .finish();

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/verify", get(auth::verify))
        .route("/logout", post(auth::logout));

    let submit = match analysis_governor {
        Some(config) => {
            let limiter = config.limiter().clone();
            rate_limit::sweep_periodically(move || limiter.retain_recent());
            info!(
                burst = rate_limit::burst_size(analysis_limit),
                window_secs = analysis_limit.window.as_secs(),
                "Analysis rate limiting enabled"
            );
            post(analysis::submit)
                .route_layer(GovernorLayer::new(config))
                .route_layer(middleware::map_response_with_state(
                    state.clone(),
                    rate_limit::analysis_rejection,
                ))
        }
        None => {
            warn!("Invalid analysis rate limit, submissions are not throttled");
            post(analysis::submit)
        }
    };

    let analysis_routes = Router::new()
        .route("/", submit)
        .route("/{id}", get(analysis::get_analysis));

    let user_routes = Router::new()
        .route("/analyses", get(user::list_analyses))
        .route("/analyses/search", get(user::search_analyses))
        .route("/analyses/{id}", delete(user::delete_analysis))
        .route("/stats", get(user::stats))
        .route("/profile", get(user::profile));

    let admin_routes = Router::new()
        .route("/stats", get(admin::stats))
        .route("/users", get(admin::list_users))
        .route("/users/{id}/status", patch(admin::update_user_status))
        .route("/analyses", get(admin::list_analyses))
        .route("/logs", get(admin::list_logs));

    let payment_routes = Router::new()
        .route("/plans", get(payment::plans))
        .route("/create-checkout-session", post(payment::create_checkout_session))
        .route("/webhook", post(payment::webhook))
        .route("/subscription-status", get(payment::subscription_status));

    let api = Router::new()
        .nest("/auth", auth_routes)
        .nest("/analysis", analysis_routes)
        .nest("/user", user_routes)
        .nest("/admin", admin_routes)
        .nest("/payment", payment_routes);

    let api = match global_governor {
        Some(config) => {
            let limiter = config.limiter().clone();
            rate_limit::sweep_periodically(move || limiter.retain_recent());
            info!(
                burst = rate_limit::burst_size(global_limit),
                window_secs = global_limit.window.as_secs(),
                "API rate limiting enabled"
            );
            api.layer(GovernorLayer::new(config))
                .layer(middleware::map_response_with_state(
                    state.clone(),
                    rate_limit::global_rejection,
                ))
        }
        None => {
            warn!("Invalid global rate limit, API is not throttled");
            api
        }
    };

    // Combine all routes
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api", api)
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
