//! Checkout initiation and verification
//!
//! Creates the local pending transaction, asks Creem for a hosted checkout
//! URL, and answers payment-status lookups. The pending row is committed
//! before the Creem call, so a provider failure can leave an orphaned
//! pending transaction behind; that tradeoff is accepted.

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::catalog::ProductCatalog;
use crate::client::CreemClient;
use crate::error::{CreditsError, CreditsResult};
use crate::store::CheckoutLedger;

/// Lifecycle of a checkout transaction
///
/// Transitions are monotonic: `Pending -> Completed` on the first valid
/// completion event, and `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    Pending,
    Completed,
    Failed,
}

impl CheckoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStatus::Pending => "pending",
            CheckoutStatus::Completed => "completed",
            CheckoutStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CheckoutStatus::Pending),
            "completed" => Some(CheckoutStatus::Completed),
            "failed" => Some(CheckoutStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for CheckoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row per checkout session
#[derive(Debug, Clone)]
pub struct CheckoutTransaction {
    pub id: Uuid,
    /// Engine-generated correlation id, created before the Creem session
    pub checkout_id: String,
    pub device_id: String,
    pub product_sku: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: CheckoutStatus,
    /// Creem's order id, assigned once payment completes
    pub creem_order_id: Option<String>,
    /// Opaque snapshot of the settling event, kept for audit only
    pub webhook_payload: Option<serde_json::Value>,
    pub created_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
}

impl CheckoutTransaction {
    pub fn pending(device_id: &str, product_sku: &str, amount_cents: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            checkout_id: Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            product_sku: product_sku.to_string(),
            amount_cents,
            currency: "USD".to_string(),
            status: CheckoutStatus::Pending,
            creem_order_id: None,
            webhook_payload: None,
            created_at: OffsetDateTime::now_utc(),
            completed_at: None,
        }
    }
}

/// Redirect handle returned to the client
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub checkout_url: String,
    pub checkout_id: String,
}

/// Payment-status lookup result
#[derive(Debug, Clone, Serialize)]
pub struct PaymentVerification {
    pub status: CheckoutStatus,
    pub product_sku: String,
    pub tokens_added: i64,
}

/// Checkout initiation over the ledger and the Creem client
#[derive(Clone)]
pub struct CheckoutService {
    ledger: Arc<dyn CheckoutLedger>,
    client: CreemClient,
    catalog: ProductCatalog,
    frontend_url: String,
}

impl CheckoutService {
    pub fn new(
        ledger: Arc<dyn CheckoutLedger>,
        client: CreemClient,
        catalog: ProductCatalog,
        frontend_url: String,
    ) -> Self {
        Self {
            ledger,
            client,
            catalog,
            frontend_url,
        }
    }

    /// Create a pending transaction and request a Creem checkout URL.
    ///
    /// The transaction row is durably written before the provider call;
    /// `checkout_id` rides along as Creem's `request_id` so the completion
    /// webhook can be correlated back.
    pub async fn create(
        &self,
        device_id: &str,
        product_sku: &str,
    ) -> CreditsResult<CheckoutSession> {
        let product = self
            .catalog
            .get(product_sku)
            .ok_or_else(|| CreditsError::UnknownProduct(product_sku.to_string()))?;

        let creem_product_id = self
            .client
            .product_id(product_sku)
            .ok_or_else(|| CreditsError::ProductNotConfigured(product_sku.to_string()))?
            .to_string();

        let transaction = CheckoutTransaction::pending(device_id, product_sku, product.amount_cents);
        let checkout_id = transaction.checkout_id.clone();
        self.ledger.insert(&transaction).await?;

        tracing::info!(
            checkout_id = %checkout_id,
            device_id = %device_id,
            product_sku = %product_sku,
            amount_cents = product.amount_cents,
            "Checkout transaction created"
        );

        let success_url = format!(
            "{}/payment/success?checkout_id={}",
            self.frontend_url, checkout_id
        );

        let checkout_url = self
            .client
            .create_checkout(&creem_product_id, &success_url, &checkout_id, device_id, product_sku)
            .await?;

        Ok(CheckoutSession {
            checkout_url,
            checkout_id,
        })
    }

    /// Look up the payment status for a checkout id
    pub async fn verify(&self, checkout_id: &str) -> CreditsResult<PaymentVerification> {
        let transaction = self
            .ledger
            .find(checkout_id)
            .await?
            .ok_or_else(|| CreditsError::TransactionNotFound(checkout_id.to_string()))?;

        let tokens_added = if transaction.status == CheckoutStatus::Completed {
            self.catalog.tokens_for(&transaction.product_sku)
        } else {
            0
        };

        Ok(PaymentVerification {
            status: transaction.status,
            product_sku: transaction.product_sku,
            tokens_added,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            CheckoutStatus::Pending,
            CheckoutStatus::Completed,
            CheckoutStatus::Failed,
        ] {
            assert_eq!(CheckoutStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CheckoutStatus::parse("refunded"), None);
    }

    #[test]
    fn test_pending_transaction_defaults() {
        let txn = CheckoutTransaction::pending("device-1", "validator_3", 499);
        assert_eq!(txn.status, CheckoutStatus::Pending);
        assert_eq!(txn.currency, "USD");
        assert!(txn.creem_order_id.is_none());
        assert!(txn.completed_at.is_none());
        assert!(!txn.checkout_id.is_empty());
    }
}
