// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payment gateway adapter trait (Razorpay, PayPal).

use async_trait::async_trait;

use crate::error::CareflowError;
use crate::types::{Gateway, PayerInfo, PaymentLink};

/// One adapter per gateway. Selected by a pure region mapping, not runtime
/// reflection.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Which gateway this adapter talks to.
    fn gateway(&self) -> Gateway;

    /// Creates an external payment order and returns a redirectable link.
    ///
    /// Failures surface as retryable [`CareflowError::Payment`]; the caller
    /// persists no partial payment row on failure.
    async fn create_link(
        &self,
        amount_minor: i64,
        currency: &str,
        reference_id: &str,
        payer: &PayerInfo,
    ) -> Result<PaymentLink, CareflowError>;

    /// Verifies a gateway webhook signature against the raw byte payload.
    fn verify_webhook(&self, signature: &str, raw_body: &[u8]) -> bool;

    /// Extracts the gateway's event id from a webhook body, when present.
    fn extract_event_id(&self, body: &serde_json::Value) -> Option<String>;
}
