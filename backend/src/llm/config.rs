//! Completion provider configuration.
//!
//! Environment variables:
//! - `LLM_PROVIDER`: `openai` or `gemini` (default: whichever key is set, OpenAI first)
//! - `OPENAI_API_KEY`, `OPENAI_MODEL` (default `gpt-4o`), `OPENAI_BASE_URL`
//! - `GEMINI_API_KEY`, `GEMINI_MODEL` (default `gemini-2.0-flash`), `GEMINI_BASE_URL`
//! - `LLM_MAX_TOKENS` (default 3500 for OpenAI, 1500 for Gemini)
//! - `LLM_TEMPERATURE` (default 0.2)
//! - `LLM_TIMEOUT_MS` (default 9500)

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com";
pub const GEMINI_DEFAULT_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TIMEOUT_MS: u64 = 9500;
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Key prefixes shipped in sample `.env` files. A key starting with one of
/// these is treated as absent.
pub const PLACEHOLDER_KEY_PREFIXES: [&str; 5] = [
    "sk-test-key",
    "sk-votre-cle",
    "AIza-test-key",
    "AIza-votre-cle",
    "AIza-demo",
];

/// True when `key` is empty or one of the known placeholders.
pub fn is_placeholder_key(key: &str) -> bool {
    let key = key.trim();
    key.is_empty() || PLACEHOLDER_KEY_PREFIXES.iter().any(|p| key.starts_with(p))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o",
            ProviderKind::Gemini => "gemini-2.0-flash",
        }
    }

    fn default_base(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => OPENAI_DEFAULT_BASE,
            ProviderKind::Gemini => GEMINI_DEFAULT_BASE,
        }
    }

    fn default_max_tokens(&self) -> u32 {
        match self {
            ProviderKind::OpenAi => 3500,
            ProviderKind::Gemini => 1500,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" | "google" => Ok(Self::Gemini),
            _ => Err(format!("Unknown LLM provider: {}", s)),
        }
    }
}

/// Settings for one completion provider.
#[derive(Clone)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

// Hand-written so the key never lands in logs.
impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LlmConfig {
    /// Defaults for `provider` with no key.
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            api_key: None,
            model: provider.default_model().to_string(),
            base_url: provider.default_base().to_string(),
            max_tokens: provider.default_max_tokens(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = base.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read configuration from the environment (see module docs).
    pub fn from_env() -> Self {
        let env = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());

        let provider = match env("LLM_PROVIDER").map(|v| v.parse::<ProviderKind>()) {
            Some(Ok(kind)) => kind,
            Some(Err(e)) => {
                tracing::warn!("{}; defaulting to openai", e);
                ProviderKind::OpenAi
            }
            None if env("OPENAI_API_KEY").is_none() && env("GEMINI_API_KEY").is_some() => {
                ProviderKind::Gemini
            }
            None => ProviderKind::OpenAi,
        };

        let (key_var, model_var, base_var) = match provider {
            ProviderKind::OpenAi => ("OPENAI_API_KEY", "OPENAI_MODEL", "OPENAI_BASE_URL"),
            ProviderKind::Gemini => ("GEMINI_API_KEY", "GEMINI_MODEL", "GEMINI_BASE_URL"),
        };

        let mut config = Self::new(provider);
        config.api_key = env(key_var);
        if let Some(model) = env(model_var) {
            config.model = model;
        }
        if let Some(base) = env(base_var) {
            config.base_url = base.trim_end_matches('/').to_string();
        }
        if let Some(n) = env("LLM_MAX_TOKENS").and_then(|v| v.parse().ok()) {
            config.max_tokens = n;
        }
        if let Some(t) = env("LLM_TEMPERATURE").and_then(|v| v.parse().ok()) {
            config.temperature = t;
        }
        if let Some(ms) = env("LLM_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            config.timeout = Duration::from_millis(ms);
        }
        config
    }

    /// The key, unless missing or a placeholder.
    pub fn usable_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !is_placeholder_key(k))
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}
