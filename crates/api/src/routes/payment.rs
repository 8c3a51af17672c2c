//! Checkout and webhook endpoints

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use ideascope_credits::{CheckoutSession, PaymentVerification, ReconcileOutcome, SIGNATURE_HEADER};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub product_sku: String,
    pub device_id: String,
}

/// POST /api/v1/payment/checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutSession>, ApiError> {
    if request.device_id.is_empty() {
        return Err(ApiError::Validation("device_id is required".to_string()));
    }

    let session = state
        .credits
        .checkout
        .create(&request.device_id, &request.product_sku)
        .await?;

    Ok(Json(session))
}

/// POST /api/v1/payment/webhook
///
/// Takes the raw body so the signature is verified over exactly the bytes
/// Creem signed. Duplicate and unrecognized events come back 200 with an
/// "ignored" status; a failure status would make Creem retry forever.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    match state.credits.webhooks.process(&body, signature).await? {
        ReconcileOutcome::Completed { tokens_granted, .. } => Ok(Json(json!({
            "status": "success",
            "tokens_added": tokens_granted,
        }))),
        ReconcileOutcome::Ignored { reason } => Ok(Json(json!({
            "status": "ignored",
            "reason": reason,
        }))),
    }
}

/// GET /api/v1/payment/verify/{checkout_id}
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(checkout_id): Path<String>,
) -> Result<Json<PaymentVerification>, ApiError> {
    let verification = state.credits.checkout.verify(&checkout_id).await?;
    Ok(Json(verification))
}
