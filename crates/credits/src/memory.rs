//! In-memory store implementation
//!
//! Backs the test suites and makes the engine/reconciler logic runnable
//! without Postgres. A single mutex over both maps gives `complete` its
//! atomicity: the status flip and the grant happen under one lock.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::checkout::{CheckoutStatus, CheckoutTransaction};
use crate::entitlement::EntitlementRecord;
use crate::error::{CreditsError, CreditsResult};
use crate::store::{CheckoutLedger, CompletionOutcome, EntitlementStore};

#[derive(Default)]
struct MemoryState {
    entitlements: HashMap<String, EntitlementRecord>,
    transactions: HashMap<String, CheckoutTransaction>,
}

/// Mutex-guarded maps standing in for the two tables
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> CreditsResult<std::sync::MutexGuard<'_, MemoryState>> {
        self.inner
            .lock()
            .map_err(|_| CreditsError::Internal("memory store lock poisoned".to_string()))
    }

    fn grant_locked(
        state: &mut MemoryState,
        device_id: &str,
        quantity: i64,
        grant_reference: &str,
        product_sku: &str,
    ) -> EntitlementRecord {
        let record = state
            .entitlements
            .entry(device_id.to_string())
            .or_insert_with(|| EntitlementRecord::new(device_id));
        record.tokens_total += quantity;
        record.last_payment_id = Some(grant_reference.to_string());
        record.last_product_sku = Some(product_sku.to_string());
        record.updated_at = OffsetDateTime::now_utc();
        record.clone()
    }
}

#[async_trait]
impl EntitlementStore for MemoryStore {
    async fn find(&self, device_id: &str) -> CreditsResult<Option<EntitlementRecord>> {
        Ok(self.lock()?.entitlements.get(device_id).cloned())
    }

    async fn create(&self, device_id: &str) -> CreditsResult<EntitlementRecord> {
        let mut state = self.lock()?;
        let record = state
            .entitlements
            .entry(device_id.to_string())
            .or_insert_with(|| EntitlementRecord::new(device_id));
        Ok(record.clone())
    }

    async fn set_trial_used(&self, device_id: &str) -> CreditsResult<()> {
        let mut state = self.lock()?;
        if let Some(record) = state.entitlements.get_mut(device_id) {
            record.free_trial_used = true;
            record.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn increment_used(&self, device_id: &str) -> CreditsResult<()> {
        let mut state = self.lock()?;
        if let Some(record) = state.entitlements.get_mut(device_id) {
            record.tokens_used += 1;
            record.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn grant(
        &self,
        device_id: &str,
        quantity: i64,
        grant_reference: &str,
        product_sku: &str,
    ) -> CreditsResult<EntitlementRecord> {
        let mut state = self.lock()?;
        Ok(Self::grant_locked(
            &mut state,
            device_id,
            quantity,
            grant_reference,
            product_sku,
        ))
    }
}

#[async_trait]
impl CheckoutLedger for MemoryStore {
    async fn insert(&self, transaction: &CheckoutTransaction) -> CreditsResult<()> {
        let mut state = self.lock()?;
        state
            .transactions
            .insert(transaction.checkout_id.clone(), transaction.clone());
        Ok(())
    }

    async fn find(&self, checkout_id: &str) -> CreditsResult<Option<CheckoutTransaction>> {
        Ok(self.lock()?.transactions.get(checkout_id).cloned())
    }

    async fn complete(
        &self,
        checkout_id: &str,
        creem_order_id: Option<&str>,
        payload: &serde_json::Value,
        tokens: i64,
    ) -> CreditsResult<CompletionOutcome> {
        let mut state = self.lock()?;

        let Some(transaction) = state.transactions.get_mut(checkout_id) else {
            return Ok(CompletionOutcome::NotFound);
        };
        if transaction.status != CheckoutStatus::Pending {
            return Ok(CompletionOutcome::AlreadyProcessed);
        }

        transaction.status = CheckoutStatus::Completed;
        transaction.completed_at = Some(OffsetDateTime::now_utc());
        transaction.creem_order_id = creem_order_id.map(str::to_string);
        transaction.webhook_payload = Some(payload.clone());

        let transaction = transaction.clone();
        let grant_reference = transaction.id.to_string();
        let entitlement = Self::grant_locked(
            &mut state,
            &transaction.device_id,
            tokens,
            &grant_reference,
            &transaction.product_sku,
        );

        Ok(CompletionOutcome::Granted {
            transaction,
            entitlement,
        })
    }
}
