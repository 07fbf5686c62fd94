// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable job queue with at-least-once delivery and exponential backoff.
//!
//! Workers claim jobs atomically (pending -> processing with a lock
//! timeout). A failed retryable job returns to pending with `available_at`
//! pushed out by base * 2^(attempt-1) seconds, capped; a permanent failure
//! or exhausted budget lands on `failed` and the caller dead-letters it.

use careflow_core::CareflowError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::QueueEntry;

/// Retry backoff parameters, from `queue` config.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base_secs: u64,
    pub backoff_cap_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_secs: 60,
            backoff_cap_secs: 240,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before the given (1-based) retry attempt:
    /// 60s, 120s, 240s for the defaults.
    pub fn delay_secs(&self, attempt: u32) -> u64 {
        let doubled = self
            .backoff_base_secs
            .saturating_mul(1u64 << attempt.saturating_sub(1).min(32));
        doubled.min(self.backoff_cap_secs)
    }
}

/// Enqueue a new job. Returns the auto-generated queue entry ID.
pub async fn enqueue(
    db: &Database,
    queue_name: &str,
    payload: &str,
    max_attempts: u32,
) -> Result<i64, CareflowError> {
    let queue_name = queue_name.to_string();
    let payload = payload.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO queue (queue_name, payload, max_attempts) VALUES (?1, ?2, ?3)",
                params![queue_name, payload, max_attempts],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Dequeue the next claimable entry from the named queue.
///
/// Atomically selects the oldest pending entry whose `available_at` has
/// passed and marks it "processing" with a 5-minute lock timeout. Returns
/// `None` if nothing is claimable.
pub async fn dequeue(db: &Database, queue_name: &str) -> Result<Option<QueueEntry>, CareflowError> {
    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let result = {
                let mut stmt = tx.prepare(
                    "SELECT id, queue_name, payload, status, attempts, max_attempts,
                            available_at, locked_until, created_at, updated_at
                     FROM queue
                     WHERE queue_name = ?1 AND status = 'pending'
                       AND available_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     ORDER BY id ASC
                     LIMIT 1",
                )?;
                stmt.query_row(params![queue_name], |row| {
                    Ok(QueueEntry {
                        id: row.get(0)?,
                        queue_name: row.get(1)?,
                        payload: row.get(2)?,
                        status: row.get(3)?,
                        attempts: row.get(4)?,
                        max_attempts: row.get(5)?,
                        available_at: row.get(6)?,
                        locked_until: row.get(7)?,
                        created_at: row.get(8)?,
                        updated_at: row.get(9)?,
                    })
                })
            };

            match result {
                Ok(entry) => {
                    tx.execute(
                        "UPDATE queue SET status = 'processing',
                         locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '+5 minutes'),
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?1",
                        params![entry.id],
                    )?;
                    tx.commit()?;

                    Ok(Some(QueueEntry {
                        status: "processing".to_string(),
                        ..entry
                    }))
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    tx.commit()?;
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Acknowledge successful processing: marks the entry "completed".
pub async fn ack(db: &Database, id: i64) -> Result<(), CareflowError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE queue SET status = 'completed', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record a failed attempt.
///
/// Retryable failures under the attempt budget go back to "pending" with
/// exponential backoff; permanent failures and exhausted budgets become
/// "failed". Returns the entry's final status and attempt count so the
/// caller can dead-letter on "failed".
pub async fn fail(
    db: &Database,
    id: i64,
    retryable: bool,
    policy: RetryPolicy,
) -> Result<(String, u32), CareflowError> {
    db.connection()
        .call(move |conn| {
            let (attempts, max_attempts): (u32, u32) = conn.query_row(
                "SELECT attempts, max_attempts FROM queue WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let new_attempts = attempts + 1;
            if !retryable || new_attempts >= max_attempts {
                conn.execute(
                    "UPDATE queue SET status = 'failed', attempts = ?1,
                     locked_until = NULL,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?2",
                    params![new_attempts, id],
                )?;
                Ok(("failed".to_string(), new_attempts))
            } else {
                let delay = policy.delay_secs(new_attempts);
                conn.execute(
                    "UPDATE queue SET status = 'pending', attempts = ?1,
                     locked_until = NULL,
                     available_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?2),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?3",
                    params![new_attempts, format!("+{delay} seconds"), id],
                )?;
                Ok(("pending".to_string(), new_attempts))
            }
        })
        .await
        .map_err(map_tr_err)
}

/// True when a pending or processing job in the named queue references
/// the event id. Lets ingestion tell a normal redelivery (job still
/// live) from a crash that marked the event pending but lost the
/// enqueue.
pub async fn has_live_job(
    db: &Database,
    queue_name: &str,
    event_id: &str,
) -> Result<bool, CareflowError> {
    let queue_name = queue_name.to_string();
    let marker = format!("\"event_id\":\"{event_id}\"");
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM queue
                 WHERE queue_name = ?1 AND status IN ('pending', 'processing')
                   AND payload LIKE '%' || ?2 || '%'",
                params![queue_name, marker],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Crash recovery: return "processing" entries whose lock lapsed to
/// "pending" without charging an attempt. Returns rows requeued.
pub async fn requeue_stale(db: &Database) -> Result<usize, CareflowError> {
    db.connection()
        .call(|conn| {
            let requeued = conn.execute(
                "UPDATE queue SET status = 'pending', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE status = 'processing'
                   AND locked_until < strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                [],
            )?;
            Ok(requeued)
        })
        .await
        .map_err(map_tr_err)
}
