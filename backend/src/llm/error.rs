use reqwest::StatusCode;
use thiserror::Error;

/// Failures talking to a completion API.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("No usable API key configured for {provider}")]
    NotConfigured { provider: &'static str },

    #[error("Completion request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Upstream rejected the API key: {0}")]
    Unauthorized(String),

    #[error("Upstream rate limit reached: {0}")]
    RateLimited(String),

    #[error("Upstream quota or billing limit exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Upstream returned no completion text")]
    EmptyResponse,

    #[error("Failed to decode upstream response: {0}")]
    Decode(String),
}

impl LlmError {
    /// Whether the caller should serve the canned report instead of failing.
    pub fn degrades_to_fallback(&self) -> bool {
        matches!(
            self,
            LlmError::NotConfigured { .. } | LlmError::Timeout { .. } | LlmError::Unauthorized(_)
        )
    }

    /// Map a non-success HTTP status (and its body) to an error.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = extract_message(body);
        match status.as_u16() {
            401 => LlmError::Unauthorized(message),
            402 => LlmError::QuotaExceeded(message),
            429 if body.contains("insufficient_quota") => LlmError::QuotaExceeded(message),
            429 => LlmError::RateLimited(message),
            // Gemini answers 400 for a malformed key. A 403 (key valid but
            // denied) stays a hard failure.
            400 if body.contains("API_KEY_INVALID") => LlmError::Unauthorized(message),
            _ if body.contains("invalid_api_key") => LlmError::Unauthorized(message),
            code => LlmError::Status {
                status: code,
                message,
            },
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout { timeout_ms: 0 }
        } else if err.is_decode() {
            LlmError::Decode(err.to_string())
        } else {
            LlmError::Transport(err.to_string())
        }
    }
}

/// Both providers wrap failures as `{"error": {"message": ...}}`.
fn extract_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(300).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let body = r#"{"error":{"message":"Incorrect API key provided"}}"#;
        match LlmError::from_status(StatusCode::UNAUTHORIZED, body) {
            LlmError::Unauthorized(msg) => assert_eq!(msg, "Incorrect API key provided"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            LlmError::from_status(StatusCode::TOO_MANY_REQUESTS, "{}"),
            LlmError::RateLimited(_)
        ));
        assert!(matches!(
            LlmError::from_status(
                StatusCode::TOO_MANY_REQUESTS,
                r#"{"error":{"code":"insufficient_quota","message":"quota"}}"#
            ),
            LlmError::QuotaExceeded(_)
        ));
        assert!(matches!(
            LlmError::from_status(StatusCode::PAYMENT_REQUIRED, ""),
            LlmError::QuotaExceeded(_)
        ));
        assert!(matches!(
            LlmError::from_status(StatusCode::BAD_GATEWAY, "oops"),
            LlmError::Status { status: 502, .. }
        ));
    }

    #[test]
    fn test_forbidden_is_not_a_key_rejection() {
        let err = LlmError::from_status(StatusCode::FORBIDDEN, r#"{"error":{"message":"region blocked"}}"#);
        assert!(matches!(err, LlmError::Status { status: 403, .. }));
        assert!(!err.degrades_to_fallback());

        let err = LlmError::from_status(
            StatusCode::FORBIDDEN,
            r#"{"error":{"code":"invalid_api_key","message":"bad key"}}"#,
        );
        assert!(matches!(err, LlmError::Unauthorized(_)));
    }

    #[test]
    fn test_gemini_invalid_key_is_unauthorized() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT","details":[{"reason":"API_KEY_INVALID"}]}}"#;
        assert!(matches!(
            LlmError::from_status(StatusCode::BAD_REQUEST, body),
            LlmError::Unauthorized(_)
        ));
    }

    #[test]
    fn test_degradation_set() {
        assert!(LlmError::NotConfigured { provider: "openai" }.degrades_to_fallback());
        assert!(LlmError::Timeout { timeout_ms: 9500 }.degrades_to_fallback());
        assert!(LlmError::Unauthorized("bad key".into()).degrades_to_fallback());
        assert!(!LlmError::RateLimited("slow down".into()).degrades_to_fallback());
        assert!(!LlmError::QuotaExceeded("billing".into()).degrades_to_fallback());
        assert!(!LlmError::EmptyResponse.degrades_to_fallback());
    }
}
