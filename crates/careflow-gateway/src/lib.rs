// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook ingestion gateway.
//!
//! One POST route per provider (Instagram, Razorpay, PayPal), each
//! verifying the provider's signature over the raw body before the
//! event passes the idempotency gate and lands on the durable queue.

pub mod handlers;
pub mod server;

pub use handlers::WEBHOOK_QUEUE;
pub use server::{GatewayState, ServerConfig, build_router, start_server};
