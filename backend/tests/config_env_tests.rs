//! `AppConfig::from_env` against the real process environment.

mod support;

use std::time::Duration;

use reia::config::AppConfig;
use reia::llm::ProviderKind;
use support::with_scoped_env;

const LLM_VARS: [&str; 9] = [
    "LLM_PROVIDER",
    "OPENAI_API_KEY",
    "OPENAI_MODEL",
    "OPENAI_BASE_URL",
    "GEMINI_API_KEY",
    "GEMINI_MODEL",
    "GEMINI_BASE_URL",
    "LLM_TIMEOUT_MS",
    "LLM_MAX_TOKENS",
];

fn cleared<'a>(extra: &[(&'a str, Option<&'a str>)]) -> Vec<(&'a str, Option<&'a str>)> {
    let mut changes: Vec<(&str, Option<&str>)> = LLM_VARS.iter().map(|k| (*k, None)).collect();
    changes.extend([
        ("JWT_SECRET", Some("env-secret")),
        ("STRIPE_SECRET_KEY", None),
        ("STRIPE_WEBHOOK_SECRET", None),
        ("STRIPE_API_BASE", None),
        ("PORT", None),
    ]);
    changes.extend_from_slice(extra);
    changes
}

#[test]
fn test_from_env_defaults_to_openai_without_key() {
    let config = with_scoped_env(&cleared(&[]), AppConfig::from_env).unwrap();
    assert_eq!(config.jwt_secret, "env-secret");
    assert_eq!(config.llm.provider, ProviderKind::OpenAi);
    assert!(config.llm.usable_key().is_none());
    assert!(config.stripe.is_none());
}

#[test]
fn test_from_env_picks_gemini_when_only_its_key_is_set() {
    let config = with_scoped_env(
        &cleared(&[
            ("GEMINI_API_KEY", Some("AIza-real-key")),
            ("GEMINI_MODEL", Some("gemini-pro")),
            ("LLM_TIMEOUT_MS", Some("2500")),
        ]),
        AppConfig::from_env,
    )
    .unwrap();
    assert_eq!(config.llm.provider, ProviderKind::Gemini);
    assert_eq!(config.llm.usable_key(), Some("AIza-real-key"));
    assert_eq!(config.llm.model, "gemini-pro");
    assert_eq!(config.llm.timeout, Duration::from_millis(2500));
}

#[test]
fn test_from_env_explicit_provider_and_placeholder_key() {
    let config = with_scoped_env(
        &cleared(&[
            ("LLM_PROVIDER", Some("openai")),
            ("OPENAI_API_KEY", Some("sk-votre-cle-ici")),
            ("GEMINI_API_KEY", Some("AIza-real-key")),
        ]),
        AppConfig::from_env,
    )
    .unwrap();
    assert_eq!(config.llm.provider, ProviderKind::OpenAi);
    assert!(config.llm.usable_key().is_none());
}

#[test]
fn test_from_env_reads_stripe() {
    let config = with_scoped_env(
        &cleared(&[
            ("STRIPE_SECRET_KEY", Some("sk_test_abc")),
            ("STRIPE_WEBHOOK_SECRET", Some("whsec_abc")),
        ]),
        AppConfig::from_env,
    )
    .unwrap();
    let stripe = config.stripe.expect("stripe configured");
    assert_eq!(stripe.secret_key, "sk_test_abc");
    assert_eq!(stripe.webhook_secret.as_deref(), Some("whsec_abc"));
    assert_eq!(stripe.api_base, "https://api.stripe.com");
}

#[test]
fn test_from_env_blank_values_count_as_unset() {
    let config = with_scoped_env(&cleared(&[("PORT", Some("   "))]), AppConfig::from_env).unwrap();
    assert_eq!(config.port, 8080);
}

#[test]
fn test_from_env_rejects_bad_numbers() {
    let result = with_scoped_env(
        &cleared(&[("RATE_LIMIT_MAX", Some("lots"))]),
        AppConfig::from_env,
    );
    assert!(result.unwrap_err().to_string().contains("RATE_LIMIT_MAX"));
}
