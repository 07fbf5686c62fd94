// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dead-letter sink for events that exhausted retries or failed to enqueue.
//!
//! Payloads may carry PHI, so they are sealed with AES-256-GCM before they
//! touch disk. Entries are operator-reviewable and never auto-reprocessed;
//! expired entries are purged after the retention window.

use careflow_core::{CareflowError, Provider};
use careflow_security::crypto;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::DeadLetterRecord;

/// Seal `payload` and persist it as the terminal record for an event.
pub async fn store_dead_letter(
    db: &Database,
    key: &[u8; 32],
    event_id: &str,
    provider: Provider,
    payload: &[u8],
    error_message: &str,
    retry_count: u32,
) -> Result<i64, CareflowError> {
    let (ciphertext, nonce) = crypto::seal(key, payload)?;
    let event_id = event_id.to_string();
    let provider = provider.to_string();
    let error_message = error_message.to_string();

    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO dead_letters
                 (event_id, provider, nonce, payload, error_message, retry_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event_id,
                    provider,
                    nonce.to_vec(),
                    ciphertext,
                    error_message,
                    retry_count
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a dead-letter record by id (operator review path).
pub async fn get_dead_letter(
    db: &Database,
    id: i64,
) -> Result<Option<DeadLetterRecord>, CareflowError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, event_id, provider, nonce, payload, error_message,
                        retry_count, failed_at
                 FROM dead_letters WHERE id = ?1",
            )?;
            let result = stmt.query_row(params![id], |row| {
                Ok(DeadLetterRecord {
                    id: row.get(0)?,
                    event_id: row.get(1)?,
                    provider: row.get(2)?,
                    nonce: row.get(3)?,
                    payload: row.get(4)?,
                    error_message: row.get(5)?,
                    retry_count: row.get(6)?,
                    failed_at: row.get(7)?,
                })
            });
            match result {
                Ok(record) => Ok(Some(record)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Decrypt a record's payload with the externally managed key.
pub fn open_payload(key: &[u8; 32], record: &DeadLetterRecord) -> Result<Vec<u8>, CareflowError> {
    let nonce: [u8; 12] = record
        .nonce
        .as_slice()
        .try_into()
        .map_err(|_| CareflowError::Internal("dead-letter nonce is not 12 bytes".into()))?;
    crypto::open(key, &nonce, &record.payload)
}

/// Delete entries older than the retention window. Returns rows purged.
pub async fn purge_expired(db: &Database, retention_days: u32) -> Result<usize, CareflowError> {
    db.connection()
        .call(move |conn| {
            let purged = conn.execute(
                "DELETE FROM dead_letters
                 WHERE failed_at < strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?1)",
                params![format!("-{retention_days} days")],
            )?;
            Ok(purged)
        })
        .await
        .map_err(map_tr_err)
}

/// Count of dead letters for an event (test and operator visibility).
pub async fn count_for_event(
    db: &Database,
    event_id: &str,
    provider: Provider,
) -> Result<i64, CareflowError> {
    let event_id = event_id.to_string();
    let provider = provider.to_string();
    db.connection()
        .call(move |conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM dead_letters WHERE event_id = ?1 AND provider = ?2",
                params![event_id, provider],
                |row| row.get(0),
            )?)
        })
        .await
        .map_err(map_tr_err)
}
