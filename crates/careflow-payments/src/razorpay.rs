// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Razorpay payment-links adapter.
//!
//! Creates payment links via the REST API with basic auth and verifies
//! webhook signatures as HMAC-SHA256 over the raw body.

use std::time::Duration;

use async_trait::async_trait;
use careflow_core::{CareflowError, Gateway, PayerInfo, PaymentGateway, PaymentLink};
use careflow_security::signature;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

const API_BASE_URL: &str = "https://api.razorpay.com/v1";

#[derive(Debug, Clone)]
pub struct RazorpayGateway {
    client: reqwest::Client,
    key_id: String,
    key_secret: String,
    webhook_secret: String,
    max_retries: u32,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PaymentLinkResponse {
    id: String,
    short_url: String,
    #[serde(default)]
    expire_by: Option<i64>,
}

impl RazorpayGateway {
    pub fn new(
        key_id: &str,
        key_secret: &str,
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
            key_id: key_id.to_string(),
            key_secret: key_secret.to_string(),
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
impl PaymentGateway for RazorpayGateway {
    fn gateway(&self) -> Gateway {
        Gateway::Razorpay
    }

    async fn create_link(
        &self,
        amount_minor: i64,
        currency: &str,
        reference_id: &str,
        payer: &PayerInfo,
    ) -> Result<PaymentLink, CareflowError> {
        let body = json!({
            "amount": amount_minor,
            "currency": currency,
            "reference_id": reference_id,
            "customer": {
                "name": payer.name,
                "email": payer.email,
                "contact": payer.phone,
            },
        });

        let url = format!("{}/payment_links", self.base_url);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying payment link creation after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = self
                .client
                .post(&url)
                .basic_auth(&self.key_id, Some(&self.key_secret))
                .json(&body)
                .send()
                .await
                .map_err(|e| CareflowError::Payment {
                    message: format!("HTTP request failed: {e}"),
                    source: Some(Box::new(e)),
                })?;

            let status = response.status();
            debug!(status = %status, attempt, "payment link response received");

            if status.is_success() {
                let parsed: PaymentLinkResponse =
                    response.json().await.map_err(|e| CareflowError::Payment {
                        message: format!("failed to parse payment link response: {e}"),
                        source: Some(Box::new(e)),
                    })?;
                return Ok(PaymentLink {
                    url: parsed.short_url,
                    gateway_order_id: parsed.id,
                    expires_at: parsed
                        .expire_by
                        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
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
            message: "payment link creation failed after retries".into(),
            source: None,
        }))
    }

    fn verify_webhook(&self, sig: &str, raw_body: &[u8]) -> bool {
        signature::verify_hmac_sha256(&self.webhook_secret, raw_body, sig)
    }

    fn extract_event_id(&self, body: &serde_json::Value) -> Option<String> {
        body.get("event_id")
            .or_else(|| {
                body.pointer("/payload/payment/entity/id")
            })
            .and_then(|v| v.as_str())
            .map(str::to_string)
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

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_gateway(base_url: &str) -> RazorpayGateway {
        RazorpayGateway::new("rzp_test_key", "rzp_test_secret", "whsec")
            .unwrap()
            .with_base_url(base_url.to_string())
    }

    fn payer() -> PayerInfo {
        PayerInfo {
            name: Some("Asha".into()),
            email: None,
            phone: Some("+919876543210".into()),
        }
    }

    #[tokio::test]
    async fn create_link_returns_order_and_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment_links"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "plink_abc",
                "short_url": "https://rzp.io/l/abc",
                "expire_by": 1790000000,
            })))
            .mount(&server)
            .await;

        let gateway = test_gateway(&server.uri());
        let link = gateway
            .create_link(50000, "INR", "appt-1", &payer())
            .await
            .unwrap();
        assert_eq!(link.gateway_order_id, "plink_abc");
        assert_eq!(link.url, "https://rzp.io/l/abc");
        assert!(link.expires_at.is_some());
    }

    #[tokio::test]
    async fn create_link_retries_transient_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment_links"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/payment_links"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "plink_retry",
                "short_url": "https://rzp.io/l/retry",
            })))
            .mount(&server)
            .await;

        let gateway = test_gateway(&server.uri());
        let link = gateway
            .create_link(50000, "INR", "appt-1", &payer())
            .await
            .unwrap();
        assert_eq!(link.gateway_order_id, "plink_retry");
    }

    #[tokio::test]
    async fn create_link_surfaces_auth_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment_links"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = test_gateway(&server.uri());
        let err = gateway
            .create_link(50000, "INR", "appt-1", &payer())
            .await
            .unwrap_err();
        assert!(matches!(err, CareflowError::Unauthorized(_)));
        assert!(!err.is_retryable(), "rejected credentials must not retry");
    }

    #[tokio::test]
    async fn create_link_treats_bad_request_as_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment_links"))
            .respond_with(ResponseTemplate::new(400).set_body_string("amount missing"))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = test_gateway(&server.uri());
        let err = gateway
            .create_link(50000, "INR", "appt-1", &payer())
            .await
            .unwrap_err();
        assert!(matches!(err, CareflowError::Validation(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn webhook_signature_round_trip() {
        let gateway = RazorpayGateway::new("k", "s", "whsec").unwrap();
        let body = br#"{"event":"payment_link.paid"}"#;
        let sig = signature::sign_hmac_sha256("whsec", body);

        assert!(gateway.verify_webhook(&sig, body));
        assert!(!gateway.verify_webhook(&sig, b"tampered"));
        assert!(!gateway.verify_webhook("deadbeef", body));
    }

    #[test]
    fn event_id_extraction_prefers_event_id() {
        let gateway = RazorpayGateway::new("k", "s", "whsec").unwrap();

        let with_event = serde_json::json!({"event_id": "evt_1"});
        assert_eq!(gateway.extract_event_id(&with_event).as_deref(), Some("evt_1"));

        let with_entity = serde_json::json!({
            "payload": {"payment": {"entity": {"id": "pay_9"}}}
        });
        assert_eq!(gateway.extract_event_id(&with_entity).as_deref(), Some("pay_9"));

        assert!(gateway.extract_event_id(&serde_json::json!({})).is_none());
    }
}
