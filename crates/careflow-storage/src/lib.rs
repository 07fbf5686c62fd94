// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Careflow booking pipeline.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a
//! single-writer concurrency model via `tokio-rusqlite`, and typed query
//! operations for the idempotency store, durable queue, dead letters,
//! conversations, booking, and payments.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::{Database, is_constraint_violation, map_tr_err, now_rfc3339};
pub use models::*;
pub use queries::queue::RetryPolicy;
