//! Application state for the HTTP server.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::repository::FullRepository;
use crate::llm::CompletionProvider;
use crate::services::{AnalyzerSettings, PasswordHasher, PropertyAnalyzer, StripeClient, TokenService};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Repository instance for database operations
    pub repository: Arc<dyn FullRepository>,
    pub analyzer: PropertyAnalyzer,
    pub tokens: TokenService,
    pub hasher: PasswordHasher,
    pub config: Arc<AppConfig>,
    /// `None` when payments are not configured.
    pub stripe: Option<StripeClient>,
}

impl AppState {
    /// Wire the services together from a repository, an LLM provider and the
    /// process configuration.
    pub fn new(
        repository: Arc<dyn FullRepository>,
        provider: Arc<dyn CompletionProvider>,
        config: AppConfig,
    ) -> Self {
        let analyzer = PropertyAnalyzer::new(
            provider,
            Arc::clone(&repository),
            AnalyzerSettings::from(&config.llm),
        );
        Self {
            analyzer,
            tokens: TokenService::new(&config.jwt_secret, config.jwt_expiry),
            hasher: PasswordHasher::new(config.bcrypt_cost),
            config: Arc::new(config),
            stripe: None,
            repository,
        }
    }

    pub fn with_stripe(mut self, client: StripeClient) -> Self {
        self.stripe = Some(client);
        self
    }
}
