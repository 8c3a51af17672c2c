//! Creem API client
//!
//! Thin wrapper over the Creem checkout endpoint. Checkout creation is the
//! only call this service makes to Creem; everything else arrives through
//! the webhook.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::error::{CreditsError, CreditsResult};

const DEFAULT_BASE_URL: &str = "https://api.creem.io";
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);

/// Creem configuration, constructed once at process start
#[derive(Debug, Clone)]
pub struct CreemConfig {
    pub api_key: String,
    /// Shared secret for webhook signature verification; empty disables
    /// verification (a deployment choice, not a security feature)
    pub webhook_secret: String,
    /// Deployment-specific SKU -> Creem product id map
    pub product_ids: HashMap<String, String>,
    pub base_url: String,
}

impl CreemConfig {
    /// Read configuration from the environment.
    ///
    /// `CREEM_PRODUCT_IDS` is a JSON object mapping catalog SKUs to Creem
    /// product ids; a malformed value is a startup error rather than a
    /// silent empty map.
    pub fn from_env() -> CreditsResult<Self> {
        let api_key = std::env::var("CREEM_API_KEY")
            .map_err(|_| CreditsError::Internal("CREEM_API_KEY must be set".to_string()))?;
        let webhook_secret = std::env::var("CREEM_WEBHOOK_SECRET").unwrap_or_default();

        let raw_ids = std::env::var("CREEM_PRODUCT_IDS").unwrap_or_else(|_| "{}".to_string());
        let product_ids: HashMap<String, String> = serde_json::from_str(&raw_ids)
            .map_err(|e| CreditsError::Internal(format!("invalid CREEM_PRODUCT_IDS: {e}")))?;

        let base_url =
            std::env::var("CREEM_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            api_key,
            webhook_secret,
            product_ids,
            base_url,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CreateCheckoutResponse {
    checkout_url: String,
}

/// HTTP client for the Creem API
#[derive(Clone)]
pub struct CreemClient {
    config: CreemConfig,
    http: reqwest::Client,
}

impl CreemClient {
    pub fn new(config: CreemConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &CreemConfig {
        &self.config
    }

    /// Creem product id for a catalog SKU, if configured
    pub fn product_id(&self, sku: &str) -> Option<&str> {
        self.config.product_ids.get(sku).map(String::as_str)
    }

    /// Create a hosted checkout session and return its redirect URL.
    ///
    /// `request_id` is our checkout id; Creem echoes it back in the
    /// completion webhook as `data.request_id`, which is how the event is
    /// correlated to the pending transaction.
    pub async fn create_checkout(
        &self,
        product_id: &str,
        success_url: &str,
        request_id: &str,
        device_id: &str,
        product_sku: &str,
    ) -> CreditsResult<String> {
        let url = format!("{}/v1/checkouts", self.config.base_url);

        let response = self
            .http
            .post(&url)
            .timeout(CHECKOUT_TIMEOUT)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "product_id": product_id,
                "success_url": success_url,
                "request_id": request_id,
                "metadata": {
                    "device_id": device_id,
                    "product_sku": product_sku,
                },
            }))
            .send()
            .await
            .map_err(|e| CreditsError::Provider(format!("checkout request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CreditsError::Provider(format!(
                "checkout creation returned {status}"
            )));
        }

        let body: CreateCheckoutResponse = response
            .json()
            .await
            .map_err(|e| CreditsError::Provider(format!("malformed checkout response: {e}")))?;

        Ok(body.checkout_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(base_url: String) -> CreemConfig {
        CreemConfig {
            api_key: "creem_test_key".to_string(),
            webhook_secret: String::new(),
            product_ids: HashMap::from([(
                "validator_3".to_string(),
                "prod_abc123".to_string(),
            )]),
            base_url,
        }
    }

    #[tokio::test]
    async fn test_create_checkout_returns_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/checkouts")
            .match_header("authorization", "Bearer creem_test_key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"checkout_url": "https://creem.io/checkout/abc", "id": "order_1"}"#)
            .create_async()
            .await;

        let client = CreemClient::new(test_config(server.url()));
        let url = client
            .create_checkout(
                "prod_abc123",
                "https://app.example.com/payment/success?checkout_id=c1",
                "c1",
                "device-1",
                "validator_3",
            )
            .await
            .unwrap();

        assert_eq!(url, "https://creem.io/checkout/abc");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_checkout_non_2xx_is_provider_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/checkouts")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let client = CreemClient::new(test_config(server.url()));
        let err = client
            .create_checkout("prod_abc123", "https://x/success", "c1", "d1", "validator_3")
            .await
            .unwrap_err();

        assert!(matches!(err, CreditsError::Provider(_)));
    }

    #[tokio::test]
    async fn test_create_checkout_malformed_body_is_provider_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/checkouts")
            .with_status(200)
            .with_body(r#"{"unexpected": true}"#)
            .create_async()
            .await;

        let client = CreemClient::new(test_config(server.url()));
        let err = client
            .create_checkout("prod_abc123", "https://x/success", "c1", "d1", "validator_3")
            .await
            .unwrap_err();

        assert!(matches!(err, CreditsError::Provider(_)));
    }

    #[test]
    fn test_product_id_lookup() {
        let client = CreemClient::new(test_config(DEFAULT_BASE_URL.to_string()));
        assert_eq!(client.product_id("validator_3"), Some("prod_abc123"));
        assert_eq!(client.product_id("validator_10"), None);
    }
}
