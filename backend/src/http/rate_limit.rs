//! Per-client rate limiting.
//!
//! Budgets are enforced by `tower_governor` layers keyed with
//! `SmartIpKeyExtractor` (forwarding headers first, then the socket peer).
//! A [`RateLimit`] of `n` requests per window becomes a bucket of `n` that
//! refills one slot every `window / n`. The helpers here turn the governor's
//! plain-text 429 into the API's JSON error shape.

use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::error::AppError;
use super::state::AppState;
use crate::config::RateLimit;

/// How often idle client buckets are dropped.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub const GLOBAL_MESSAGE: &str = "Too many requests from this IP, please try again later.";
pub const ANALYSIS_MESSAGE: &str =
    "Analysis limit reached. Please wait a minute before submitting again.";

/// Bucket size for `limit`. Never zero.
pub fn burst_size(limit: RateLimit) -> u32 {
    limit.max_requests.max(1)
}

/// Time for one slot to refill. Never zero.
pub fn replenish_period(limit: RateLimit) -> Duration {
    (limit.window / burst_size(limit)).max(Duration::from_millis(1))
}

/// Run `sweep` every [`SWEEP_INTERVAL`] on the current runtime, if any.
pub fn sweep_periodically(sweep: impl Fn() + Send + 'static) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        return;
    };
    handle.spawn(async move {
        let mut tick = tokio::time::interval(SWEEP_INTERVAL);
        tick.tick().await;
        loop {
            tick.tick().await;
            sweep();
        }
    });
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

/// Seconds until the client may retry, as reported by the governor.
fn wait_secs(response: &Response) -> Option<u64> {
    [header::RETRY_AFTER.as_str(), "x-ratelimit-after"]
        .iter()
        .find_map(|name| response.headers().get(*name))
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Replace a governor rejection with an `AppError` body that keeps a
/// `Retry-After` header. Other responses pass through untouched.
fn reshape(response: Response, message: &str, limit: RateLimit) -> Response {
    if response.status() != StatusCode::TOO_MANY_REQUESTS || is_json(&response) {
        return response;
    }
    let secs = wait_secs(&response)
        .unwrap_or_else(|| replenish_period(limit).as_secs())
        .max(1);
    debug!(retry_after = secs, "Rate limit exceeded");

    let mut reshaped = AppError::TooManyRequests(message.to_string()).into_response();
    reshaped
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    reshaped
}

/// Response mapper for the budget shared by every `/api` route.
pub async fn global_rejection(State(state): State<AppState>, response: Response) -> Response {
    reshape(response, GLOBAL_MESSAGE, state.config.global_rate_limit)
}

/// Response mapper for analysis submissions.
pub async fn analysis_rejection(State(state): State<AppState>, response: Response) -> Response {
    reshape(response, ANALYSIS_MESSAGE, state.config.analysis_rate_limit)
}
