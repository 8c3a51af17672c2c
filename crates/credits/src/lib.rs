// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Ideascope Credits Module
//!
//! Handles the credit system that gates AI idea validation: one free trial
//! per device, paid token packs purchased through Creem, and exactly-once
//! reconciliation of Creem completion webhooks.
//!
//! ## Features
//!
//! - **Entitlement Engine**: check / consume / grant / status over
//!   per-device credit records, free trial always spent before paid tokens
//! - **Checkout**: pending-transaction creation and Creem redirect URLs
//! - **Webhooks**: HMAC-verified completion events settled idempotently
//!   against the checkout ledger
//! - **Stores**: Postgres for production, in-memory for tests

pub mod catalog;
pub mod checkout;
pub mod client;
pub mod entitlement;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod webhooks;


// Catalog
pub use catalog::{Product, ProductCatalog};

// Checkout
pub use checkout::{
    CheckoutService, CheckoutSession, CheckoutStatus, CheckoutTransaction, PaymentVerification,
};

// Client
pub use client::{CreemClient, CreemConfig};

// Entitlement
pub use entitlement::{
    AccessDecision, CreditBasis, CreditStatus, EntitlementEngine, EntitlementRecord,
};

// Error
pub use error::{CreditsError, CreditsResult};

// Stores
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use store::{CheckoutLedger, CompletionOutcome, EntitlementStore};

// Webhooks
pub use webhooks::{verify_signature, ReconcileOutcome, WebhookReconciler, SIGNATURE_HEADER};

use std::sync::Arc;

use sqlx::PgPool;

/// Main credits service combining the entitlement engine, checkout
/// initiation and webhook reconciliation over one backing store
#[derive(Clone)]
pub struct CreditsService {
    pub entitlements: EntitlementEngine,
    pub checkout: CheckoutService,
    pub webhooks: WebhookReconciler,
}

impl CreditsService {
    /// Create a credits service backed by Postgres
    pub fn new(pool: PgPool, config: CreemConfig, frontend_url: String) -> Self {
        Self::with_store(Arc::new(PostgresStore::new(pool)), config, frontend_url)
    }

    /// Create a credits service from environment variables
    pub fn from_env(pool: PgPool, frontend_url: String) -> CreditsResult<Self> {
        let config = CreemConfig::from_env()?;
        Ok(Self::new(pool, config, frontend_url))
    }

    /// Create a credits service over any store implementation
    pub fn with_store<S>(store: Arc<S>, config: CreemConfig, frontend_url: String) -> Self
    where
        S: EntitlementStore + CheckoutLedger + 'static,
    {
        let catalog = ProductCatalog;
        let webhook_secret = config.webhook_secret.clone();
        let client = CreemClient::new(config);

        let entitlement_store: Arc<dyn EntitlementStore> = store.clone();
        let ledger: Arc<dyn CheckoutLedger> = store;

        Self {
            entitlements: EntitlementEngine::new(entitlement_store),
            checkout: CheckoutService::new(ledger.clone(), client, catalog, frontend_url),
            webhooks: WebhookReconciler::new(ledger, catalog, webhook_secret),
        }
    }
}
