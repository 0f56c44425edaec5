//! Process configuration read from the environment.
//!
//! `.env` files are loaded by the server binary before this runs. Every
//! setting has a default except `JWT_SECRET`, which must be set in release
//! builds.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::llm::{LlmConfig, ProviderKind};
use crate::services::auth::{DEFAULT_BCRYPT_COST, DEFAULT_TOKEN_TTL_DAYS};
use crate::services::billing::StripeConfig;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
const DEV_JWT_SECRET: &str = "reia-development-secret-change-me";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JWT_SECRET must be set")]
    MissingJwtSecret,

    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// A fixed-window request budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimit {
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

/// 100 requests per 15 minutes per client.
pub const DEFAULT_GLOBAL_LIMIT: RateLimit = RateLimit::new(100, Duration::from_secs(15 * 60));
/// 10 analysis submissions per minute per client.
pub const DEFAULT_ANALYSIS_LIMIT: RateLimit = RateLimit::new(10, Duration::from_secs(60));

#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_expiry: chrono::Duration,
    pub bcrypt_cost: u32,
    /// Lower-cased addresses that receive the admin role on registration.
    pub admin_emails: Vec<String>,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
    pub frontend_url: String,
    pub global_rate_limit: RateLimit,
    pub analysis_rate_limit: RateLimit,
    pub llm: LlmConfig,
    pub stripe: Option<StripeConfig>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_expiry", &self.jwt_expiry)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("admin_emails", &self.admin_emails)
            .field("cors_origins", &self.cors_origins)
            .field("frontend_url", &self.frontend_url)
            .field("global_rate_limit", &self.global_rate_limit)
            .field("analysis_rate_limit", &self.analysis_rate_limit)
            .field("llm", &self.llm)
            .field("stripe", &self.stripe.as_ref().map(|_| "<configured>"))
            .finish()
    }
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

impl AppConfig {
    /// Read the full configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config =
            Self::from_lookup(|k| std::env::var(k).ok().filter(|v| !v.trim().is_empty()))?;
        config.llm = LlmConfig::from_env();
        config.stripe = StripeConfig::from_env();
        Ok(config)
    }

    /// Server settings from an arbitrary key lookup. LLM and Stripe settings
    /// are left at their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret = match lookup("JWT_SECRET") {
            Some(secret) => secret,
            None if cfg!(debug_assertions) => {
                warn!("JWT_SECRET not set, using the development secret");
                DEV_JWT_SECRET.to_string()
            }
            None => return Err(ConfigError::MissingJwtSecret),
        };

        let expiry_days: i64 = parse_or(&lookup, "JWT_EXPIRY_DAYS", DEFAULT_TOKEN_TTL_DAYS)?;
        if expiry_days <= 0 {
            return Err(ConfigError::Invalid {
                var: "JWT_EXPIRY_DAYS",
                value: expiry_days.to_string(),
            });
        }

        let global_rate_limit = RateLimit::new(
            parse_or(&lookup, "RATE_LIMIT_MAX", DEFAULT_GLOBAL_LIMIT.max_requests)?,
            Duration::from_secs(parse_or(
                &lookup,
                "RATE_LIMIT_WINDOW_SECS",
                DEFAULT_GLOBAL_LIMIT.window.as_secs(),
            )?),
        );
        let analysis_rate_limit = RateLimit::new(
            parse_or(
                &lookup,
                "ANALYSIS_RATE_LIMIT_MAX",
                DEFAULT_ANALYSIS_LIMIT.max_requests,
            )?,
            Duration::from_secs(parse_or(
                &lookup,
                "ANALYSIS_RATE_LIMIT_WINDOW_SECS",
                DEFAULT_ANALYSIS_LIMIT.window.as_secs(),
            )?),
        );

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            jwt_secret,
            jwt_expiry: chrono::Duration::days(expiry_days),
            bcrypt_cost: parse_or(&lookup, "BCRYPT_COST", DEFAULT_BCRYPT_COST)?,
            admin_emails: split_list(lookup("ADMIN_EMAILS"))
                .into_iter()
                .map(|e| e.to_lowercase())
                .collect(),
            cors_origins: split_list(lookup("CORS_ORIGINS")),
            frontend_url: lookup("FRONTEND_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string()),
            global_rate_limit,
            analysis_rate_limit,
            llm: LlmConfig::new(ProviderKind::OpenAi),
            stripe: None,
        })
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.to_lowercase();
        self.admin_emails.iter().any(|a| *a == email)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.jwt_expiry, chrono::Duration::days(7));
        assert_eq!(config.bcrypt_cost, DEFAULT_BCRYPT_COST);
        assert_eq!(config.global_rate_limit, DEFAULT_GLOBAL_LIMIT);
        assert!(config.cors_origins.is_empty());
        assert!(config.stripe.is_none());
    }

    #[test]
    fn test_lists_are_trimmed_and_admin_emails_lowercased() {
        let config = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("ADMIN_EMAILS", " Boss@Example.com, ,ops@example.com"),
            ("CORS_ORIGINS", "http://a.test,http://b.test/"),
        ]))
        .unwrap();
        assert_eq!(config.admin_emails, vec!["boss@example.com", "ops@example.com"]);
        assert!(config.is_admin_email("BOSS@example.com"));
        assert!(!config.is_admin_email("user@example.com"));
        assert_eq!(config.cors_origins.len(), 2);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("JWT_SECRET", "x"), ("PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "PORT", .. }));

        let err = AppConfig::from_lookup(lookup(&[("JWT_SECRET", "x"), ("JWT_EXPIRY_DAYS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "JWT_EXPIRY_DAYS", .. }));
    }

    #[test]
    fn test_debug_hides_secret() {
        let config = AppConfig::from_lookup(lookup(&[("JWT_SECRET", "hunter2")])).unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
