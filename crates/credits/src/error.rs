//! Error types for the credits crate

use thiserror::Error;

/// Errors produced by the entitlement, checkout and webhook components
#[derive(Debug, Error)]
pub enum CreditsError {
    /// Database-level failure (connection, query, transaction)
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// SKU not present in the static product catalog
    #[error("unknown product sku: {0}")]
    UnknownProduct(String),

    /// SKU is known but has no Creem product id configured for this deployment
    #[error("product not configured: {0}")]
    ProductNotConfigured(String),

    /// Checkout provider unreachable, returned non-2xx, or sent a malformed body
    #[error("checkout provider error: {0}")]
    Provider(String),

    /// Webhook signature missing or did not match the configured secret
    #[error("webhook signature invalid")]
    SignatureInvalid,

    /// Webhook body was not a valid event envelope
    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),

    /// No checkout transaction exists for the given checkout id
    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    /// Catch-all for unexpected internal states
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience result type used throughout the crate
pub type CreditsResult<T> = Result<T, CreditsError>;
