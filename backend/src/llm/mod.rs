//! Hosted LLM completion clients.
//!
//! [`CompletionProvider`] is the seam the analysis service talks to. Two
//! implementations exist: [`openai::OpenAiProvider`] and
//! [`gemini::GeminiProvider`]. [`fallback`] produces the canned report used
//! when no provider is reachable.

use std::sync::Arc;

use async_trait::async_trait;

pub mod config;
pub mod error;
pub mod fallback;
pub mod gemini;
pub mod openai;
pub mod prompt;

pub use config::{is_placeholder_key, LlmConfig, ProviderKind};
pub use error::LlmError;

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Completion text plus token accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tokens_used: i64,
    pub model: String,
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short provider name for logs and audit rows.
    fn name(&self) -> &'static str;

    /// False when no usable API key is configured.
    fn is_configured(&self) -> bool;

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError>;
}

/// Build the provider selected by `config`.
pub fn provider_from_config(config: LlmConfig) -> Result<Arc<dyn CompletionProvider>, LlmError> {
    Ok(match config.provider {
        ProviderKind::OpenAi => Arc::new(openai::OpenAiProvider::new(config)?),
        ProviderKind::Gemini => Arc::new(gemini::GeminiProvider::new(config)?),
    })
}

/// Shared reqwest client construction for both providers.
pub(crate) fn build_http_client(config: &LlmConfig) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(config.timeout)
        .user_agent(concat!("reia/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| LlmError::Transport(e.to_string()))
}

/// `reqwest` errors with the configured timeout filled in.
pub(crate) fn map_request_error(err: reqwest::Error, config: &LlmConfig) -> LlmError {
    match LlmError::from(err) {
        LlmError::Timeout { .. } => LlmError::Timeout {
            timeout_ms: config.timeout_ms(),
        },
        other => other,
    }
}
