// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Idempotency store operations over `(event_id, provider)`.
//!
//! Status advances monotonically: pending -> processed or pending -> failed.
//! The UNIQUE constraint makes concurrent first-sight inserts collapse to a
//! single row.

use std::str::FromStr;

use careflow_core::{CareflowError, EventStatus, Provider};
use rusqlite::params;

use crate::database::{Database, map_tr_err};

/// Look up the idempotency status for an event. `None` means never seen.
pub async fn check_status(
    db: &Database,
    event_id: &str,
    provider: Provider,
) -> Result<Option<EventStatus>, CareflowError> {
    let event_id = event_id.to_string();
    let provider = provider.to_string();
    let status: Option<String> = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT status FROM webhook_events WHERE event_id = ?1 AND provider = ?2",
            )?;
            let result = stmt.query_row(params![event_id, provider], |row| row.get(0));
            match result {
                Ok(status) => Ok(Some(status)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)?;

    match status {
        None => Ok(None),
        Some(s) => EventStatus::from_str(&s)
            .map(Some)
            .map_err(|_| CareflowError::Internal(format!("unknown event status '{s}'"))),
    }
}

/// Record first sight of an event as `pending`. A concurrent or repeated
/// insert is a no-op; an existing status is never downgraded.
pub async fn mark_pending(
    db: &Database,
    event_id: &str,
    provider: Provider,
) -> Result<(), CareflowError> {
    let event_id = event_id.to_string();
    let provider = provider.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO webhook_events (event_id, provider, status)
                 VALUES (?1, ?2, 'pending')",
                params![event_id, provider],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Advance a pending event to `processed`.
pub async fn mark_processed(
    db: &Database,
    event_id: &str,
    provider: Provider,
) -> Result<(), CareflowError> {
    let event_id = event_id.to_string();
    let provider = provider.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE webhook_events SET status = 'processed'
                 WHERE event_id = ?1 AND provider = ?2 AND status = 'pending'",
                params![event_id, provider],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Advance a pending event to `failed`, recording the final retry count.
/// Never demotes a processed event.
pub async fn mark_failed(
    db: &Database,
    event_id: &str,
    provider: Provider,
    retry_count: u32,
) -> Result<(), CareflowError> {
    let event_id = event_id.to_string();
    let provider = provider.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE webhook_events SET status = 'failed', retry_count = ?3
                 WHERE event_id = ?1 AND provider = ?2 AND status = 'pending'",
                params![event_id, provider, retry_count],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
