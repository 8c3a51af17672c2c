//! Creem webhook handling
//!
//! Verifies inbound event authenticity and reconciles completion events
//! against the checkout ledger. A checkout transaction moves
//! `pending -> completed` exactly once; every other observed delivery is
//! reported as an ignored outcome (with a reason) rather than an error, so
//! Creem's at-least-once redelivery never sees a failure for a duplicate.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::catalog::ProductCatalog;
use crate::error::{CreditsError, CreditsResult};
use crate::store::{CheckoutLedger, CompletionOutcome};

type HmacSha256 = Hmac<Sha256>;

/// Creem signs the raw request body with HMAC-SHA256 and sends the hex
/// digest in the `creem-signature` header.
pub const SIGNATURE_HEADER: &str = "creem-signature";

const CHECKOUT_COMPLETED: &str = "checkout.completed";

/// Verify a webhook signature against the shared secret.
///
/// An empty secret disables verification entirely. With a secret
/// configured, a missing or mismatched signature is rejected. The
/// comparison is constant-time to avoid a timing side channel.
pub fn verify_signature(secret: &str, body: &[u8], signature: Option<&str>) -> CreditsResult<()> {
    if secret.is_empty() {
        return Ok(());
    }

    let Some(signature) = signature else {
        return Err(CreditsError::SignatureInvalid);
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| CreditsError::SignatureInvalid)?;
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    if bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
        Ok(())
    } else {
        Err(CreditsError::SignatureInvalid)
    }
}

/// JSON envelope Creem delivers: `{"type": ..., "data": {...}}`
#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Result of reconciling one delivered event
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// First delivery of a valid completion: tokens were granted
    Completed {
        checkout_id: String,
        device_id: String,
        tokens_granted: i64,
    },
    /// Event accepted but deliberately not acted on
    Ignored { reason: String },
}

/// Consumes completion events and settles them against the ledger
#[derive(Clone)]
pub struct WebhookReconciler {
    ledger: Arc<dyn CheckoutLedger>,
    catalog: ProductCatalog,
    webhook_secret: String,
}

impl WebhookReconciler {
    pub fn new(ledger: Arc<dyn CheckoutLedger>, catalog: ProductCatalog, webhook_secret: String) -> Self {
        Self {
            ledger,
            catalog,
            webhook_secret,
        }
    }

    /// Verify, parse, and reconcile one inbound delivery.
    ///
    /// Errors are reserved for rejections (bad signature, unparseable
    /// body, storage failure); anything the provider may legitimately
    /// redeliver comes back as [`ReconcileOutcome::Ignored`].
    pub async fn process(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> CreditsResult<ReconcileOutcome> {
        verify_signature(&self.webhook_secret, body, signature)?;

        let envelope: WebhookEnvelope = serde_json::from_slice(body)
            .map_err(|e| CreditsError::InvalidPayload(e.to_string()))?;

        if envelope.event_type != CHECKOUT_COMPLETED {
            tracing::info!(
                event_type = %envelope.event_type,
                "Ignoring webhook event with no handler"
            );
            return Ok(ReconcileOutcome::Ignored {
                reason: format!("unhandled event: {}", envelope.event_type),
            });
        }

        let Some(checkout_id) = envelope
            .data
            .get("request_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
        else {
            return Ok(ReconcileOutcome::Ignored {
                reason: "no request_id".to_string(),
            });
        };

        let Some(transaction) = self.ledger.find(&checkout_id).await? else {
            tracing::warn!(checkout_id = %checkout_id, "Completion event for unknown checkout");
            return Ok(ReconcileOutcome::Ignored {
                reason: "transaction not found".to_string(),
            });
        };

        let tokens = self.catalog.tokens_for(&transaction.product_sku);
        if tokens == 0 {
            tracing::warn!(
                checkout_id = %checkout_id,
                product_sku = %transaction.product_sku,
                "Completing checkout for SKU with no catalog entry; granting nothing"
            );
        }

        let order_id = envelope.data.get("id").and_then(|v| v.as_str());
        let payload = serde_json::from_slice(body)
            .map_err(|e| CreditsError::InvalidPayload(e.to_string()))?;

        match self
            .ledger
            .complete(&checkout_id, order_id, &payload, tokens)
            .await?
        {
            CompletionOutcome::Granted {
                transaction,
                entitlement,
            } => {
                tracing::info!(
                    checkout_id = %checkout_id,
                    device_id = %transaction.device_id,
                    tokens_granted = tokens,
                    tokens_total = entitlement.tokens_total,
                    "Checkout completed and tokens granted"
                );
                Ok(ReconcileOutcome::Completed {
                    checkout_id,
                    device_id: transaction.device_id,
                    tokens_granted: tokens,
                })
            }
            CompletionOutcome::AlreadyProcessed => {
                tracing::info!(checkout_id = %checkout_id, "Duplicate completion event ignored");
                Ok(ReconcileOutcome::Ignored {
                    reason: "already processed".to_string(),
                })
            }
            CompletionOutcome::NotFound => Ok(ReconcileOutcome::Ignored {
                reason: "transaction not found".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature_accepted() {
        let body = br#"{"type":"checkout.completed"}"#;
        let signature = sign("topsecret", body);
        assert!(verify_signature("topsecret", body, Some(&signature)).is_ok());
    }

    #[test]
    fn test_wrong_signature_rejected() {
        let body = br#"{"type":"checkout.completed"}"#;
        let signature = sign("othersecret", body);
        let err = verify_signature("topsecret", body, Some(&signature)).unwrap_err();
        assert!(matches!(err, CreditsError::SignatureInvalid));
    }

    #[test]
    fn test_missing_signature_rejected_when_secret_configured() {
        let body = br#"{}"#;
        let err = verify_signature("topsecret", body, None).unwrap_err();
        assert!(matches!(err, CreditsError::SignatureInvalid));
    }

    #[test]
    fn test_verification_skipped_without_secret() {
        let body = br#"{}"#;
        assert!(verify_signature("", body, None).is_ok());
        assert!(verify_signature("", body, Some("garbage")).is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let signature = sign("topsecret", br#"{"amount":499}"#);
        let err =
            verify_signature("topsecret", br#"{"amount":9900}"#, Some(&signature)).unwrap_err();
        assert!(matches!(err, CreditsError::SignatureInvalid));
    }
}
