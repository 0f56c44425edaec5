//! `/api/analysis`: submit a property for analysis and fetch stored results.

use axum::extract::{Path, State};
use axum::Json;

use super::{parse_id, HandlerResult};
use crate::http::dto::{AnalysisDto, AnalysisResponse, AnalysisResultResponse, AnalysisSubmission};
use crate::http::error::AppError;
use crate::http::extract::{AuthUser, JsonBody, MaybeAuthUser};
use crate::http::state::AppState;
use crate::models::AnalysisId;
use crate::services::validation::validate_analysis;
use crate::services::AnalysisRequest;

/// POST /api/analysis
///
/// Authentication is optional; anonymous submissions are stored without an
/// owner.
pub async fn submit(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    JsonBody(body): JsonBody<AnalysisSubmission>,
) -> HandlerResult<AnalysisResultResponse> {
    let analysis_type = validate_analysis(
        &body.property_address,
        body.acquisition_notes.as_deref(),
        body.analysis_type.as_deref(),
    )?;

    let request = AnalysisRequest {
        property_address: body.property_address.trim().to_string(),
        acquisition_notes: body
            .acquisition_notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        analysis_type,
    };

    let outcome = state
        .analyzer
        .analyze(user.map(|u| u.id), request)
        .await?;

    Ok(Json(AnalysisResultResponse {
        success: true,
        analysis: outcome.into(),
    }))
}

/// GET /api/analysis/{id}
pub async fn get_analysis(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(raw_id): Path<String>,
) -> HandlerResult<AnalysisResponse> {
    let id: AnalysisId = parse_id(&raw_id, "Invalid analysis ID")?;
    let analysis = state
        .repository
        .get_analysis_for_user(id, user.id)
        .await
        .map_err(|e| {
            if e.is_not_found() {
                AppError::NotFound("Analysis not found".to_string())
            } else {
                e.into()
            }
        })?;

    Ok(Json(AnalysisResponse {
        success: true,
        analysis: AnalysisDto::from(analysis),
    }))
}
