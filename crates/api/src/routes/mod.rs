//! HTTP routing

pub mod payment;
pub mod tokens;
pub mod validate;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/validate", post(validate::validate_idea))
        .route("/api/v1/reports/{report_id}", get(validate::get_report))
        .route("/api/v1/tokens/status", get(tokens::token_status))
        .route("/api/v1/payment/checkout", post(payment::create_checkout))
        .route("/api/v1/payment/webhook", post(payment::handle_webhook))
        .route(
            "/api/v1/payment/verify/{checkout_id}",
            get(payment::verify_payment),
        )
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
