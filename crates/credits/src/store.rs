//! Storage traits for the entitlement store and checkout ledger
//!
//! The entitlement engine and webhook reconciler operate against these
//! traits rather than a concrete database, so the same logic runs over
//! Postgres in production and an in-memory store in tests.

use async_trait::async_trait;

use crate::checkout::CheckoutTransaction;
use crate::entitlement::EntitlementRecord;
use crate::error::CreditsResult;

/// Per-device credit records
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    async fn find(&self, device_id: &str) -> CreditsResult<Option<EntitlementRecord>>;

    /// Insert a zeroed record for the device. Safe to race with a
    /// concurrent create for the same device; both callers observe the
    /// single surviving row.
    async fn create(&self, device_id: &str) -> CreditsResult<EntitlementRecord>;

    async fn set_trial_used(&self, device_id: &str) -> CreditsResult<()>;

    async fn increment_used(&self, device_id: &str) -> CreditsResult<()>;

    /// Add `quantity` to the device's total and stamp the grant trace
    /// fields, creating the record if absent. Returns the updated record.
    async fn grant(
        &self,
        device_id: &str,
        quantity: i64,
        grant_reference: &str,
        product_sku: &str,
    ) -> CreditsResult<EntitlementRecord>;
}

/// Outcome of attempting to settle a checkout transaction
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    /// First delivery: status flipped out of `pending` and tokens granted
    Granted {
        transaction: CheckoutTransaction,
        entitlement: EntitlementRecord,
    },
    /// The transaction was no longer pending; nothing changed
    AlreadyProcessed,
    /// No transaction exists for the checkout id
    NotFound,
}

/// Per-checkout transaction records
#[async_trait]
pub trait CheckoutLedger: Send + Sync {
    async fn insert(&self, transaction: &CheckoutTransaction) -> CreditsResult<()>;

    async fn find(&self, checkout_id: &str) -> CreditsResult<Option<CheckoutTransaction>>;

    /// Settle a completion event: compare-and-set the status out of
    /// `pending`, stamp `completed_at` / the Creem order id, store the raw
    /// event payload, and grant `tokens` to the transaction's device — all
    /// as one atomic unit. Concurrent deliveries of the same event resolve
    /// to exactly one `Granted`; the rest observe `AlreadyProcessed`.
    async fn complete(
        &self,
        checkout_id: &str,
        creem_order_id: Option<&str>,
        payload: &serde_json::Value,
        tokens: i64,
    ) -> CreditsResult<CompletionOutcome>;
}
