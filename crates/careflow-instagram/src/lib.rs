// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Instagram channel adapter over the Graph API.
//!
//! Implements [`ChannelSender`] for outbound DMs and provides webhook
//! helpers: signature verification over the raw body and event-id
//! derivation from inbound payloads.

pub mod webhook;

use std::time::Duration;

use async_trait::async_trait;
use careflow_core::{CareflowError, ChannelSender, MessageId};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

const API_BASE_URL: &str = "https://graph.instagram.com/v21.0";

/// Instagram DM sender.
///
/// Status mapping: 401/403 surface as [`CareflowError::Unauthorized`],
/// 404 as [`CareflowError::Validation`] (bad recipient), 429 and 5xx as
/// retryable [`CareflowError::Channel`], as do network failures.
#[derive(Debug, Clone)]
pub struct InstagramSender {
    client: reqwest::Client,
    access_token: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    message_id: String,
}

impl InstagramSender {
    pub fn new(access_token: &str) -> Result<Self, CareflowError> {
        if access_token.is_empty() {
            return Err(CareflowError::Config(
                "instagram.access_token cannot be empty".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CareflowError::Channel {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            access_token: access_token.to_string(),
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
impl ChannelSender for InstagramSender {
    fn platform(&self) -> &str {
        "instagram"
    }

    async fn send_text(
        &self,
        recipient_id: &str,
        text: &str,
    ) -> Result<MessageId, CareflowError> {
        let url = format!("{}/me/messages", self.base_url);
        let body = json!({
            "recipient": {"id": recipient_id},
            "message": {"text": text},
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| CareflowError::Channel {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        debug!(status = %status, recipient_id, "send response received");

        if status.is_success() {
            let parsed: SendResponse =
                response.json().await.map_err(|e| CareflowError::Channel {
                    message: format!("failed to parse send response: {e}"),
                    source: Some(Box::new(e)),
                })?;
            return Ok(MessageId(parsed.message_id));
        }

        let text_body = response.text().await.unwrap_or_default();
        warn!(status = %status, body = %text_body, "send failed");
        match status.as_u16() {
            401 | 403 => Err(CareflowError::Unauthorized(format!(
                "Graph API rejected credentials ({status})"
            ))),
            404 => Err(CareflowError::Validation(format!(
                "unknown recipient '{recipient_id}'"
            ))),
            _ => Err(CareflowError::Channel {
                message: format!("Graph API returned {status}: {text_body}"),
                source: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_sender(base_url: &str) -> InstagramSender {
        InstagramSender::new("test-token")
            .unwrap()
            .with_base_url(base_url.to_string())
    }

    #[tokio::test]
    async fn send_text_returns_platform_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "recipient_id": "user-1",
                "message_id": "mid.12345",
            })))
            .mount(&server)
            .await;

        let sender = test_sender(&server.uri());
        let id = sender.send_text("user-1", "hello").await.unwrap();
        assert_eq!(id.0, "mid.12345");
    }

    #[tokio::test]
    async fn auth_failure_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/messages"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let sender = test_sender(&server.uri());
        let err = sender.send_text("user-1", "hello").await.unwrap_err();
        assert!(matches!(err, CareflowError::Unauthorized(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn unknown_recipient_is_a_validation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/messages"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let sender = test_sender(&server.uri());
        let err = sender.send_text("ghost", "hello").await.unwrap_err();
        assert!(matches!(err, CareflowError::Validation(_)));
    }

    #[tokio::test]
    async fn rate_limit_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/messages"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let sender = test_sender(&server.uri());
        let err = sender.send_text("user-1", "hello").await.unwrap_err();
        assert!(matches!(err, CareflowError::Channel { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn empty_token_is_a_config_error() {
        assert!(matches!(
            InstagramSender::new(""),
            Err(CareflowError::Config(_))
        ));
    }
}
