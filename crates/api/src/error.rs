//! API error type and HTTP mapping
//!
//! Every failure class gets its own status code so clients can react
//! without parsing text: 402 is always "buy more credits", 503 is always
//! "a collaborator is down", and neither is ever conflated with 400/500.
//! Bodies carry a single string `detail` field to keep client rendering
//! simple.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ideascope_credits::CreditsError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request fields, rejected before entitlement state is touched
    #[error("{0}")]
    Validation(String),

    /// The device has no free trial or tokens left
    #[error("{0}")]
    PaymentRequired(String),

    /// Webhook authenticity check failed
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    /// An external collaborator (LLM proxy or Creem) failed
    #[error("{0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            // Internal details stay in the logs, not the response body.
            ApiError::Internal(e) => {
                tracing::error!(error = ?e, "Internal server error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<CreditsError> for ApiError {
    fn from(err: CreditsError) -> Self {
        match err {
            CreditsError::UnknownProduct(sku) => {
                ApiError::Validation(format!("invalid product sku: {sku}"))
            }
            CreditsError::Provider(msg) => {
                ApiError::ServiceUnavailable(format!("payment service error: {msg}"))
            }
            CreditsError::SignatureInvalid => {
                ApiError::Unauthorized("invalid webhook signature".to_string())
            }
            CreditsError::InvalidPayload(msg) => {
                ApiError::Validation(format!("invalid webhook payload: {msg}"))
            }
            CreditsError::TransactionNotFound(id) => {
                ApiError::NotFound(format!("transaction not found: {id}"))
            }
            other => ApiError::Internal(anyhow::Error::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credits_error_mapping() {
        let err: ApiError = CreditsError::UnknownProduct("x".to_string()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err: ApiError = CreditsError::SignatureInvalid.into();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err: ApiError = CreditsError::TransactionNotFound("c1".to_string()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: ApiError = CreditsError::Provider("down".to_string()).into();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);

        let err: ApiError = CreditsError::ProductNotConfigured("x".to_string()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_payment_required_is_distinct() {
        let err = ApiError::PaymentRequired("no credits".to_string());
        assert_eq!(err.status(), StatusCode::PAYMENT_REQUIRED);
    }
}
