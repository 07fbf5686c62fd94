// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Careflow pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Name of the durable queue carrying webhook jobs from gateway to worker.
pub const WEBHOOK_QUEUE: &str = "webhooks";

/// Webhook providers the ingestion gateway accepts events from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Instagram,
    Razorpay,
    Paypal,
}

/// Payment gateways selectable by doctor region.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Gateway {
    Razorpay,
    Paypal,
}

/// Idempotency status of a webhook event. Advances monotonically:
/// pending -> processed or pending -> failed, never reverses.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Processed,
    Failed,
}

/// The fixed intent set the classifier maps user messages into.
///
/// Any value outside this set returned by the external capability is
/// coerced to [`Intent::Unknown`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    BookAppointment,
    Reschedule,
    CancelAppointment,
    Greeting,
    Question,
    PaymentQuery,
    ConsentYes,
    ConsentNo,
    Unknown,
}

/// Classifier output: an intent from the fixed set plus a confidence in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: Intent,
    pub confidence: f32,
}

impl IntentResult {
    /// The fallback result for empty, invalid, or exhausted-retry classifications.
    pub fn unknown() -> Self {
        Self {
            intent: Intent::Unknown,
            confidence: 0.0,
        }
    }
}

/// The durable job payload carried through the queue from gateway to worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub event_id: String,
    pub provider: Provider,
    pub payload: serde_json::Value,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Unique identifier for a platform message, as returned by a channel sender.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// A payment link produced by a gateway adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLink {
    /// Redirectable checkout URL for the patient.
    pub url: String,
    /// Gateway-side order identifier, unique per gateway. This is the join
    /// key for later webhook-driven status updates.
    pub gateway_order_id: String,
    /// Link expiry, when the gateway reports one.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Payer identity forwarded to a payment gateway when creating a link.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayerInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}
