// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Intent classification capability.

use async_trait::async_trait;

use crate::types::IntentResult;

/// Classifies a user message into the fixed intent set.
///
/// Infallible by contract: implementations absorb redaction, caching,
/// retries, and parse failures internally and fall back to
/// [`IntentResult::unknown`](crate::types::IntentResult::unknown) rather
/// than surfacing an error into the conversation turn.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, text: &str, correlation_id: &str) -> IntentResult;
}
