// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! PayPal checkout-orders adapter.
//!
//! Creates an order and returns its approval link. Webhook verification
//! uses a shared-secret HMAC over the raw body, configured on the PayPal
//! webhook as a custom signing secret.

use std::time::Duration;

use async_trait::async_trait;
use careflow_core::{CareflowError, Gateway, PayerInfo, PaymentGateway, PaymentLink};
use careflow_security::signature;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

const API_BASE_URL: &str = "https://api-m.paypal.com";

#[derive(Debug, Clone)]
pub struct PaypalGateway {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    webhook_secret: String,
    max_retries: u32,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    links: Vec<OrderLink>,
}

#[derive(Debug, Deserialize)]
struct OrderLink {
    rel: String,
    href: String,
}

impl PaypalGateway {
    pub fn new(
        client_id: &str,
        client_secret: &str,
        webhook_secret: &str,
    ) -> Result<Self, CareflowError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CareflowError::Payment {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            webhook_secret: webhook_secret.to_string(),
            max_retries: 1,
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[async_trait]
impl PaymentGateway for PaypalGateway {
    fn gateway(&self) -> Gateway {
        Gateway::Paypal
    }

    async fn create_link(
        &self,
        amount_minor: i64,
        currency: &str,
        reference_id: &str,
        _payer: &PayerInfo,
    ) -> Result<PaymentLink, CareflowError> {
        // PayPal order amounts are decimal major units.
        let amount = format!("{}.{:02}", amount_minor / 100, amount_minor % 100);
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": reference_id,
                "amount": {"currency_code": currency, "value": amount},
            }],
        });

        let url = format!("{}/v2/checkout/orders", self.base_url);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying order creation after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = self
                .client
                .post(&url)
                .basic_auth(&self.client_id, Some(&self.client_secret))
                .json(&body)
                .send()
                .await
                .map_err(|e| CareflowError::Payment {
                    message: format!("HTTP request failed: {e}"),
                    source: Some(Box::new(e)),
                })?;

            let status = response.status();
            debug!(status = %status, attempt, "order response received");

            if status.is_success() {
                let parsed: OrderResponse =
                    response.json().await.map_err(|e| CareflowError::Payment {
                        message: format!("failed to parse order response: {e}"),
                        source: Some(Box::new(e)),
                    })?;
                let approve = parsed
                    .links
                    .iter()
                    .find(|l| l.rel == "approve")
                    .map(|l| l.href.clone())
                    .ok_or_else(|| CareflowError::Payment {
                        message: "order response had no approve link".into(),
                        source: None,
                    })?;
                return Ok(PaymentLink {
                    url: approve,
                    gateway_order_id: parsed.id,
                    expires_at: None,
                });
            }

            let text = response.text().await.unwrap_or_default();
            if is_transient_error(status) {
                warn!(status = %status, body = %text, "transient error from gateway");
                last_error = Some(CareflowError::Payment {
                    message: format!("gateway returned {status}: {text}"),
                    source: None,
                });
                continue;
            }

            return Err(permanent_error(status, &text));
        }

        Err(last_error.unwrap_or_else(|| CareflowError::Payment {
            message: "order creation failed after retries".into(),
            source: None,
        }))
    }

    fn verify_webhook(&self, sig: &str, raw_body: &[u8]) -> bool {
        signature::verify_hmac_sha256(&self.webhook_secret, raw_body, sig)
    }

    fn extract_event_id(&self, body: &serde_json::Value) -> Option<String> {
        body.get("id").and_then(|v| v.as_str()).map(str::to_string)
    }
}

fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500..=599)
}

/// Non-transient responses must not burn the job's retry budget:
/// rejected credentials are `Unauthorized`, other 4xx are `Validation`.
fn permanent_error(status: reqwest::StatusCode, body: &str) -> CareflowError {
    match status.as_u16() {
        401 | 403 => CareflowError::Unauthorized(format!("gateway returned {status}: {body}")),
        400..=499 => CareflowError::Validation(format!("gateway returned {status}: {body}")),
        _ => CareflowError::Payment {
            message: format!("gateway returned {status}: {body}"),
            source: None,
        },
    }
}
