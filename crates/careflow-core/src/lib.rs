// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Careflow booking pipeline.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the Careflow workspace. The gateway and
//! worker consume external capabilities exclusively through the traits
//! defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::CareflowError;
pub use types::{
    EventStatus, Gateway, Intent, IntentResult, JobEnvelope, MessageId, PayerInfo, PaymentLink,
    Provider, WEBHOOK_QUEUE,
};

pub use traits::{ChannelSender, IntentClassifier, NotificationSender, PaymentGateway};
