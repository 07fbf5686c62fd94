// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound Instagram webhook helpers: signature verification and
//! event-id derivation.
//!
//! Meta signs the raw request body with the app secret and sends the
//! HMAC-SHA256 hex digest in `X-Hub-Signature-256` as `sha256=<hex>`.

use careflow_security::signature;
use serde::Deserialize;

/// Verify an `X-Hub-Signature-256` header against the raw body.
pub fn verify_signature(app_secret: &str, raw_body: &[u8], header_value: &str) -> bool {
    signature::verify_hmac_sha256(app_secret, raw_body, header_value)
}

/// One messaging entry extracted from a webhook payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub page_id: String,
    pub sender_id: String,
    pub message_id: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: String,
    #[serde(default)]
    messaging: Vec<Messaging>,
}

#[derive(Debug, Deserialize)]
struct Messaging {
    sender: Sender,
    #[serde(default)]
    message: Option<MessageBody>,
}

#[derive(Debug, Deserialize)]
struct Sender {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    #[serde(default)]
    mid: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

/// Extract the text messages from a webhook payload. Entries without a
/// text body (reactions, read receipts) are skipped. A message without a
/// `mid` gets a deterministic id derived from its content, so redeliveries
/// still dedupe.
pub fn extract_messages(body: &serde_json::Value) -> Vec<InboundMessage> {
    let envelope: WebhookEnvelope = match serde_json::from_value(body.clone()) {
        Ok(env) => env,
        Err(_) => return Vec::new(),
    };

    let mut messages = Vec::new();
    for entry in envelope.entry {
        for messaging in entry.messaging {
            let Some(message) = messaging.message else {
                continue;
            };
            let Some(text) = message.text else {
                continue;
            };
            let message_id = message.mid.unwrap_or_else(|| {
                let material = format!("{}:{}:{}", entry.id, messaging.sender.id, text);
                signature::sha256_hex(material.as_bytes())
            });
            messages.push(InboundMessage {
                page_id: entry.id.clone(),
                sender_id: messaging.sender.id.clone(),
                message_id,
                text,
            });
        }
    }
    messages
}

/// Event id for idempotency: the first message id, else a hash of the
/// whole body so even unparseable payloads dedupe consistently.
pub fn derive_event_id(body: &serde_json::Value, raw_body: &[u8]) -> String {
    extract_messages(body)
        .first()
        .map(|m| m.message_id.clone())
        .unwrap_or_else(|| signature::sha256_hex(raw_body))
}
