//! Entitlement engine
//!
//! Decides whether a device may run a generation and mutates its credit
//! balance. The rules are fixed: a device's single free trial is always
//! consumed before any purchased token, so paid tokens are never spent on
//! a request the trial would have covered.
//!
//! `check` and `consume` are deliberately two separate store round-trips
//! rather than one atomic primitive. Two concurrent requests from the same
//! device can both pass `check`; the first `consume` wins the trial flag
//! and the second falls through to the paid branch. This is an accepted
//! race on a single low-value device-level resource.

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::CreditsResult;
use crate::store::EntitlementStore;

/// Per-device credit balance
#[derive(Debug, Clone, Serialize)]
pub struct EntitlementRecord {
    pub id: Uuid,
    /// Opaque client-supplied device identity; the core does not verify it
    pub device_id: String,
    /// Cumulative tokens ever granted
    pub tokens_total: i64,
    /// Cumulative tokens ever consumed
    pub tokens_used: i64,
    /// One-time free trial flag
    pub free_trial_used: bool,
    /// Reference to the most recent grant (not an append-only ledger)
    pub last_payment_id: Option<String>,
    pub last_product_sku: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl EntitlementRecord {
    /// Fresh zeroed record for a device
    pub fn new(device_id: &str) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            device_id: device_id.to_string(),
            tokens_total: 0,
            tokens_used: 0,
            free_trial_used: false,
            last_payment_id: None,
            last_product_sku: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Remaining paid tokens, clamped so it never goes negative even if
    /// `tokens_used` somehow exceeds `tokens_total`
    pub fn tokens_remaining(&self) -> i64 {
        (self.tokens_total - self.tokens_used).max(0)
    }
}

/// What a positive access decision was based on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditBasis {
    FreeTrial,
    Paid,
    NoTokens,
}

impl std::fmt::Display for CreditBasis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreditBasis::FreeTrial => write!(f, "free_trial"),
            CreditBasis::Paid => write!(f, "paid"),
            CreditBasis::NoTokens => write!(f, "no_tokens"),
        }
    }
}

/// Result of an eligibility check
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub basis: CreditBasis,
}

/// Snapshot of a device's credit state
#[derive(Debug, Clone, Serialize)]
pub struct CreditStatus {
    pub free_trial_used: bool,
    pub tokens_total: i64,
    pub tokens_used: i64,
    pub tokens_remaining: i64,
    pub can_generate: bool,
}

/// Business logic over the entitlement store
#[derive(Clone)]
pub struct EntitlementEngine {
    store: Arc<dyn EntitlementStore>,
}

impl EntitlementEngine {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    async fn get_or_create(&self, device_id: &str) -> CreditsResult<EntitlementRecord> {
        if let Some(record) = self.store.find(device_id).await? {
            return Ok(record);
        }
        self.store.create(device_id).await
    }

    /// Decide whether a device may generate. Pure decision: creates the
    /// zeroed record for an unseen device but never mutates counters.
    pub async fn check(&self, device_id: &str) -> CreditsResult<AccessDecision> {
        let record = self.get_or_create(device_id).await?;

        if !record.free_trial_used {
            return Ok(AccessDecision {
                allowed: true,
                basis: CreditBasis::FreeTrial,
            });
        }

        if record.tokens_remaining() > 0 {
            return Ok(AccessDecision {
                allowed: true,
                basis: CreditBasis::Paid,
            });
        }

        Ok(AccessDecision {
            allowed: false,
            basis: CreditBasis::NoTokens,
        })
    }

    /// Spend one generation credit, trial first. Returns false and mutates
    /// nothing when the device has neither trial nor tokens left.
    pub async fn consume(&self, device_id: &str) -> CreditsResult<bool> {
        let record = self.get_or_create(device_id).await?;

        if !record.free_trial_used {
            self.store.set_trial_used(device_id).await?;
            tracing::info!(device_id = %device_id, "Free trial consumed");
            return Ok(true);
        }

        if record.tokens_remaining() > 0 {
            self.store.increment_used(device_id).await?;
            tracing::info!(
                device_id = %device_id,
                remaining = record.tokens_remaining() - 1,
                "Paid token consumed"
            );
            return Ok(true);
        }

        Ok(false)
    }

    /// Add purchased tokens to a device's balance.
    ///
    /// Not idempotent: calling this twice for the same payment doubles the
    /// balance. Exactly-once delivery is the webhook reconciler's job.
    pub async fn grant(
        &self,
        device_id: &str,
        quantity: i64,
        grant_reference: &str,
        product_sku: &str,
    ) -> CreditsResult<EntitlementRecord> {
        let record = self
            .store
            .grant(device_id, quantity, grant_reference, product_sku)
            .await?;
        tracing::info!(
            device_id = %device_id,
            quantity = quantity,
            product_sku = %product_sku,
            "Tokens granted"
        );
        Ok(record)
    }

    /// Current credit state for a device
    pub async fn status(&self, device_id: &str) -> CreditsResult<CreditStatus> {
        let record = self.get_or_create(device_id).await?;
        let tokens_remaining = record.tokens_remaining();
        Ok(CreditStatus {
            free_trial_used: record.free_trial_used,
            tokens_total: record.tokens_total,
            tokens_used: record.tokens_used,
            tokens_remaining,
            can_generate: !record.free_trial_used || tokens_remaining > 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_remaining_clamped() {
        let mut record = EntitlementRecord::new("device-1");
        record.tokens_total = 2;
        record.tokens_used = 5;
        assert_eq!(record.tokens_remaining(), 0);
    }

    #[test]
    fn test_basis_wire_format() {
        assert_eq!(CreditBasis::FreeTrial.to_string(), "free_trial");
        assert_eq!(CreditBasis::Paid.to_string(), "paid");
        assert_eq!(CreditBasis::NoTokens.to_string(), "no_tokens");
    }
}
