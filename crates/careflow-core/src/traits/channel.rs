// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat-platform sender trait (Instagram DMs, future platforms).

use async_trait::async_trait;

use crate::error::CareflowError;
use crate::types::MessageId;

/// Outbound message delivery for a chat platform.
///
/// Implementations map platform responses onto the error taxonomy:
/// 401/403/404 become permanent [`CareflowError::Validation`] /
/// [`CareflowError::Unauthorized`], 429 and 5xx become retryable
/// [`CareflowError::Channel`], network failures likewise.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Platform name for logging and audit metadata.
    fn platform(&self) -> &str;

    /// Sends a plain-text message to a platform recipient.
    async fn send_text(
        &self,
        recipient_id: &str,
        text: &str,
    ) -> Result<MessageId, CareflowError>;
}
