//! Idea validation endpoint
//!
//! The orchestration here is deliberately ordered: validate input, check
//! entitlement, call the analyst, and only then consume a credit — so a
//! failed analysis never costs the device anything.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::Language;
use crate::error::ApiError;
use crate::reports::ValidationReport;
use crate::state::AppState;

const TITLE_MIN: usize = 3;
const TITLE_MAX: usize = 200;
const DESCRIPTION_MIN: usize = 20;
const DESCRIPTION_MAX: usize = 5000;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub idea_title: String,
    pub idea_description: String,
    #[serde(default = "default_language")]
    pub language: Language,
}

fn default_language() -> Language {
    Language::En
}

#[derive(Debug, Deserialize)]
pub struct DeviceQuery {
    #[serde(default)]
    pub device_id: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub report_id: Uuid,
    pub overall_score: i32,
    pub market_analysis: serde_json::Value,
    pub competition_analysis: serde_json::Value,
    pub technical_feasibility: serde_json::Value,
    pub business_model: serde_json::Value,
    pub risks: serde_json::Value,
    pub suggestions: serde_json::Value,
    pub summary: String,
}

fn validate_request(request: &ValidateRequest) -> Result<(), ApiError> {
    let title_len = request.idea_title.chars().count();
    if !(TITLE_MIN..=TITLE_MAX).contains(&title_len) {
        return Err(ApiError::Validation(format!(
            "idea_title must be between {TITLE_MIN} and {TITLE_MAX} characters"
        )));
    }

    let description_len = request.idea_description.chars().count();
    if !(DESCRIPTION_MIN..=DESCRIPTION_MAX).contains(&description_len) {
        return Err(ApiError::Validation(format!(
            "idea_description must be between {DESCRIPTION_MIN} and {DESCRIPTION_MAX} characters"
        )));
    }

    Ok(())
}

/// POST /api/v1/validate
pub async fn validate_idea(
    State(state): State<AppState>,
    Query(query): Query<DeviceQuery>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>, ApiError> {
    if query.device_id.is_empty() {
        return Err(ApiError::Validation("device_id is required".to_string()));
    }
    validate_request(&request)?;

    let decision = state.credits.entitlements.check(&query.device_id).await?;
    if !decision.allowed {
        return Err(ApiError::PaymentRequired(
            "No generation credits remaining. Please purchase more validations.".to_string(),
        ));
    }

    let analysis = state
        .analyst
        .analyze(
            &request.idea_title,
            &request.idea_description,
            request.language,
        )
        .await
        .map_err(|e| ApiError::ServiceUnavailable(format!("validation failed: {e}")))?;

    // The analysis succeeded; now the credit is spent. A lost check/consume
    // race can make this fail, in which case the device still gets its
    // report for free rather than paying for nothing.
    let consumed = state.credits.entitlements.consume(&query.device_id).await?;
    if !consumed {
        tracing::warn!(
            device_id = %query.device_id,
            basis = %decision.basis,
            "Credit consume failed after successful analysis"
        );
    }

    let report = state
        .reports
        .insert(
            &query.device_id,
            &request.idea_title,
            &request.idea_description,
            request.language.as_str(),
            &analysis,
        )
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    tracing::info!(
        report_id = %report.id,
        device_id = %query.device_id,
        overall_score = analysis.overall_score,
        "Validation report generated"
    );

    Ok(Json(ValidateResponse {
        report_id: report.id,
        overall_score: analysis.overall_score,
        market_analysis: analysis.market_analysis,
        competition_analysis: analysis.competition_analysis,
        technical_feasibility: analysis.technical_feasibility,
        business_model: analysis.business_model,
        risks: analysis.risks,
        suggestions: analysis.suggestions,
        summary: analysis.summary,
    }))
}

/// GET /api/v1/reports/{report_id}
pub async fn get_report(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
) -> Result<Json<ValidationReport>, ApiError> {
    let id = Uuid::parse_str(&report_id)
        .map_err(|_| ApiError::NotFound("report not found".to_string()))?;

    let report = state
        .reports
        .find(id)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .ok_or_else(|| ApiError::NotFound("report not found".to_string()))?;

    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(title: &str, description: &str) -> ValidateRequest {
        ValidateRequest {
            idea_title: title.to_string(),
            idea_description: description.to_string(),
            language: Language::En,
        }
    }

    #[test]
    fn test_valid_request_passes() {
        let req = request("Robo-barista", "An espresso robot for offices with busy mornings.");
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn test_title_bounds() {
        let description = "A description easily long enough to pass validation.";
        assert!(validate_request(&request("ab", description)).is_err());
        assert!(validate_request(&request("abc", description)).is_ok());
        assert!(validate_request(&request(&"x".repeat(200), description)).is_ok());
        assert!(validate_request(&request(&"x".repeat(201), description)).is_err());
    }

    #[test]
    fn test_description_bounds() {
        assert!(validate_request(&request("Robo-barista", &"d".repeat(19))).is_err());
        assert!(validate_request(&request("Robo-barista", &"d".repeat(20))).is_ok());
        assert!(validate_request(&request("Robo-barista", &"d".repeat(5000))).is_ok());
        assert!(validate_request(&request("Robo-barista", &"d".repeat(5001))).is_err());
    }

    #[test]
    fn test_language_parsing() {
        let req: ValidateRequest = serde_json::from_str(
            r#"{"idea_title": "Robo-barista", "idea_description": "Espresso robots for offices.", "language": "ko"}"#,
        )
        .unwrap();
        assert_eq!(req.language, Language::Ko);

        // Unknown languages are rejected at the schema boundary.
        assert!(serde_json::from_str::<ValidateRequest>(
            r#"{"idea_title": "t", "idea_description": "d", "language": "tlh"}"#,
        )
        .is_err());

        // Language defaults to English when omitted.
        let req: ValidateRequest = serde_json::from_str(
            r#"{"idea_title": "Robo-barista", "idea_description": "Espresso robots for offices."}"#,
        )
        .unwrap();
        assert_eq!(req.language, Language::En);
    }
}
