//! Property analysis orchestration.
//!
//! ```text
//! request ──► provider configured? ──no──► canned report (demo mode)
//!                   │yes
//!                   ▼
//!       complete() raced against timeout
//!          │ok            │timeout / bad key      │other error
//!          ▼              ▼                       ▼
//!     model text     canned report            audit + fail
//!          └──────┬───────┘
//!                 ▼
//!        persist + audit completion
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::db::repository::{FullRepository, RepositoryError};
use crate::llm::{
    fallback, prompt, CompletionProvider, CompletionRequest, LlmConfig, LlmError,
};
use crate::models::{Analysis, AnalysisType, AuditAction, NewAnalysis, NewAuditEvent, UserId};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Request knobs taken from [`LlmConfig`].
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerSettings {
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl From<&LlmConfig> for AnalyzerSettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            timeout: config.timeout,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// A validated submission.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub property_address: String,
    pub acquisition_notes: Option<String>,
    pub analysis_type: AnalysisType,
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub analysis: Analysis,
    pub processing_time_ms: u64,
    pub is_demo_mode: bool,
}

impl AnalysisOutcome {
    pub fn is_anonymous(&self) -> bool {
        self.analysis.user_id.is_none()
    }
}

struct Report {
    text: String,
    tokens_used: i64,
    is_demo_mode: bool,
}

impl Report {
    fn canned(request: &AnalysisRequest) -> Self {
        Self {
            text: fallback::canned_analysis(
                &request.property_address,
                request.acquisition_notes.as_deref(),
                request.analysis_type,
            ),
            tokens_used: 0,
            is_demo_mode: true,
        }
    }
}

/// Runs a submission through the provider and stores the result.
#[derive(Clone)]
pub struct PropertyAnalyzer {
    provider: Arc<dyn CompletionProvider>,
    repository: Arc<dyn FullRepository>,
    settings: AnalyzerSettings,
}

impl PropertyAnalyzer {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        repository: Arc<dyn FullRepository>,
        settings: AnalyzerSettings,
    ) -> Self {
        Self {
            provider,
            repository,
            settings,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_configured()
    }

    pub async fn analyze(
        &self,
        user_id: Option<UserId>,
        request: AnalysisRequest,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let started = Instant::now();

        let report = if !self.provider.is_configured() {
            info!(
                provider = self.provider.name(),
                "No usable API key, serving canned analysis"
            );
            Report::canned(&request)
        } else {
            self.audit(
                AuditAction::AnalysisStarted,
                user_id,
                json!({
                    "propertyAddress": request.property_address,
                    "analysisType": request.analysis_type,
                    "provider": self.provider.name(),
                }),
            )
            .await;

            match self.call_provider(&request).await {
                Ok(report) => report,
                Err(e) if e.degrades_to_fallback() => {
                    warn!(provider = self.provider.name(), error = %e, "Falling back to canned analysis");
                    Report::canned(&request)
                }
                Err(e) => {
                    error!(provider = self.provider.name(), error = %e, "Analysis failed");
                    self.audit(
                        AuditAction::AnalysisError,
                        user_id,
                        json!({
                            "error": e.to_string(),
                            "propertyAddress": request.property_address,
                        }),
                    )
                    .await;
                    return Err(e.into());
                }
            }
        };

        let analysis = self
            .repository
            .insert_analysis(&NewAnalysis {
                user_id,
                property_address: request.property_address,
                acquisition_notes: request.acquisition_notes,
                ai_analysis: report.text,
                analysis_type: request.analysis_type,
                tokens_used: report.tokens_used,
            })
            .await?;

        let processing_time_ms = started.elapsed().as_millis() as u64;
        self.audit(
            AuditAction::AnalysisCompleted,
            user_id,
            json!({
                "analysisId": analysis.id,
                "tokensUsed": analysis.tokens_used,
                "processingTime": processing_time_ms,
                "isAnonymous": user_id.is_none(),
                "isDemoMode": report.is_demo_mode,
            }),
        )
        .await;

        info!(
            analysis_id = %analysis.id,
            tokens = analysis.tokens_used,
            elapsed_ms = processing_time_ms,
            demo = report.is_demo_mode,
            "Analysis completed"
        );

        Ok(AnalysisOutcome {
            analysis,
            processing_time_ms,
            is_demo_mode: report.is_demo_mode,
        })
    }

    async fn call_provider(&self, request: &AnalysisRequest) -> Result<Report, LlmError> {
        let completion_request = CompletionRequest {
            system: prompt::SYSTEM_PROMPT.to_string(),
            prompt: prompt::build_prompt(
                &request.property_address,
                request.acquisition_notes.as_deref(),
                request.analysis_type,
            ),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let completion = tokio::time::timeout(
            self.settings.timeout,
            self.provider.complete(&completion_request),
        )
        .await
        .map_err(|_| LlmError::Timeout {
            timeout_ms: self.settings.timeout.as_millis() as u64,
        })??;

        Ok(Report {
            text: completion.text,
            tokens_used: completion.tokens_used,
            is_demo_mode: false,
        })
    }

    /// Audit rows are best effort; a failed insert is logged, not surfaced.
    async fn audit(&self, action: AuditAction, user_id: Option<UserId>, details: serde_json::Value) {
        if let Err(e) = self
            .repository
            .record_event(&NewAuditEvent::new(action, user_id, details))
            .await
        {
            warn!(action = %action, error = %e, "Failed to record audit event");
        }
    }
}
