// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits consumed by the gateway and worker.
//!
//! External collaborators (chat platform, AI classifier, payment gateways,
//! email) are expressed as trait objects so the orchestrator can be tested
//! against in-process fakes.

pub mod channel;
pub mod classifier;
pub mod notify;
pub mod payment;

pub use channel::ChannelSender;
pub use classifier::IntentClassifier;
pub use notify::NotificationSender;
pub use payment::PaymentGateway;
