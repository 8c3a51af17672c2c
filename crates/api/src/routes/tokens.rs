//! Token status endpoint

use axum::extract::{Query, State};
use axum::Json;

use ideascope_credits::CreditStatus;

use crate::error::ApiError;
use crate::routes::validate::DeviceQuery;
use crate::state::AppState;

/// GET /api/v1/tokens/status
pub async fn token_status(
    State(state): State<AppState>,
    Query(query): Query<DeviceQuery>,
) -> Result<Json<CreditStatus>, ApiError> {
    if query.device_id.is_empty() {
        return Err(ApiError::Validation("device_id is required".to_string()));
    }

    let status = state.credits.entitlements.status(&query.device_id).await?;
    Ok(Json(status))
}
