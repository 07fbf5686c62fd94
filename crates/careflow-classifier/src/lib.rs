// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM-backed intent classification.
//!
//! Every inbound patient message passes through here before the
//! conversation state machine sees it. The pipeline per message:
//! redact PII, check the TTL cache, call the chat-completions API,
//! parse the `{intent, confidence}` object, and record an audit entry
//! (metadata only). Any failure degrades to `Intent::Unknown` rather
//! than erroring the turn.

pub mod cache;
pub mod client;
pub mod types;

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use careflow_core::{CareflowError, Intent, IntentClassifier, IntentResult};
use careflow_security::redact;
use careflow_storage::Database;
use careflow_storage::queries::audit;
use serde_json::json;
use tracing::{debug, warn};

use crate::cache::IntentCache;
use crate::client::ClassifierClient;
use crate::types::{ChatMessage, ChatRequest, ClassificationPayload};

const SYSTEM_PROMPT: &str = "You are an intent classifier for a medical appointment \
assistant. Classify the patient message into exactly one of: book_appointment, \
reschedule, cancel_appointment, greeting, question, payment_query, consent_yes, \
consent_no, unknown. Respond with only a JSON object: \
{\"intent\": \"<intent>\", \"confidence\": <0.0-1.0>}";

/// Classifier configuration, from the `classifier` config section.
#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub model: String,
    pub max_tokens: u32,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
}

/// [`IntentClassifier`] backed by a chat-completions API with redaction,
/// caching, and audit recording.
pub struct LlmClassifier {
    client: ClassifierClient,
    cache: IntentCache,
    settings: ClassifierSettings,
    db: Database,
}

impl LlmClassifier {
    pub fn new(
        api_key: &str,
        settings: ClassifierSettings,
        db: Database,
    ) -> Result<Self, CareflowError> {
        let client = ClassifierClient::new(api_key)?;
        let cache = IntentCache::new(settings.cache_capacity, settings.cache_ttl);
        Ok(Self {
            client,
            cache,
            settings,
            db,
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, url: String) -> Self {
        self.client = self.client.with_base_url(url);
        self
    }

    async fn call_api(&self, redacted_text: &str) -> Result<(IntentResult, u32), CareflowError> {
        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: SYSTEM_PROMPT.into(),
                },
                ChatMessage {
                    role: "user".into(),
                    content: redacted_text.into(),
                },
            ],
            max_tokens: self.settings.max_tokens,
            temperature: 0.0,
        };

        let response = self.client.complete(&request).await?;
        let total_tokens = response
            .usage
            .as_ref()
            .map(|u| u.total_tokens)
            .unwrap_or_default();
        let content = response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| CareflowError::Provider {
                message: "classification response had no choices".into(),
                source: None,
            })?;

        let payload: ClassificationPayload =
            serde_json::from_str(content.trim()).map_err(|e| CareflowError::Provider {
                message: format!("unparseable classification payload: {e}"),
                source: Some(Box::new(e)),
            })?;

        let intent = Intent::from_str(&payload.intent).unwrap_or(Intent::Unknown);
        Ok((
            IntentResult {
                intent,
                confidence: payload.confidence.clamp(0.0, 1.0),
            },
            total_tokens,
        ))
    }

    async fn record_audit(
        &self,
        correlation_id: &str,
        result: &IntentResult,
        total_tokens: u32,
        redacted: bool,
        status: &str,
    ) {
        let recorded = audit::record(
            &self.db,
            "classification",
            Some(correlation_id),
            json!({
                "model": self.settings.model,
                "intent": result.intent.to_string(),
                "confidence": result.confidence,
                "total_tokens": total_tokens,
                "redacted": redacted,
                "status": status,
            }),
        )
        .await;
        if let Err(e) = recorded {
            warn!(error = %e, "failed to record classification audit entry");
        }
    }
}

#[async_trait]
impl IntentClassifier for LlmClassifier {
    async fn classify(&self, text: &str, correlation_id: &str) -> IntentResult {
        let redacted = redact::redact(text);
        let key = IntentCache::key(&redacted.text);

        if let Some(hit) = self.cache.get(&key) {
            debug!(intent = %hit.intent, "classification cache hit");
            return hit;
        }

        match self.call_api(&redacted.text).await {
            Ok((result, total_tokens)) => {
                self.cache.insert(key, result.clone());
                self.record_audit(correlation_id, &result, total_tokens, redacted.applied, "ok")
                    .await;
                result
            }
            Err(e) => {
                warn!(error = %e, "classification failed, falling back to unknown");
                let fallback = IntentResult::unknown();
                self.record_audit(correlation_id, &fallback, 0, redacted.applied, "error")
                    .await;
                fallback
            }
        }
    }
}
