// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Email notification capability.

use async_trait::async_trait;

/// Sends transactional email (booking confirmations).
///
/// Returns `true` on success. Failures are logged by the implementation and
/// must never abort the booking or payment flow that triggered them, so the
/// trait deliberately does not return a `Result`.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str, correlation_id: &str)
    -> bool;
}
