use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::UserId;

crate::define_id_type!(i64, AnalysisId);

/// Number of characters of the generated report shown in list views.
pub const PREVIEW_CHARS: usize = 200;

/// Depth of the requested analysis. Only changes the prompt emphasis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    #[default]
    Standard,
    Detailed,
    Investment,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 3] = [
        AnalysisType::Standard,
        AnalysisType::Detailed,
        AnalysisType::Investment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Standard => "standard",
            AnalysisType::Detailed => "detailed",
            AnalysisType::Investment => "investment",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "detailed" => Ok(Self::Detailed),
            "investment" => Ok(Self::Investment),
            _ => Err(format!("Unknown analysis type: {}", s)),
        }
    }
}

/// A stored property analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub id: AnalysisId,
    /// `None` for anonymous submissions.
    pub user_id: Option<UserId>,
    pub property_address: String,
    pub acquisition_notes: Option<String>,
    /// Markdown report returned by the model (or the canned fallback).
    pub ai_analysis: String,
    pub analysis_type: AnalysisType,
    pub tokens_used: i64,
    pub created_at: DateTime<Utc>,
}

impl Analysis {
    pub fn preview(&self) -> String {
        preview_of(&self.ai_analysis)
    }
}

/// First [`PREVIEW_CHARS`] characters, with an ellipsis once the text reaches
/// that length.
pub fn preview_of(text: &str) -> String {
    let head: String = text.chars().take(PREVIEW_CHARS).collect();
    if head.chars().count() >= PREVIEW_CHARS {
        format!("{}...", head)
    } else {
        head
    }
}

/// Insert payload for a new analysis.
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub user_id: Option<UserId>,
    pub property_address: String,
    pub acquisition_notes: Option<String>,
    pub ai_analysis: String,
    pub analysis_type: AnalysisType,
    pub tokens_used: i64,
}
