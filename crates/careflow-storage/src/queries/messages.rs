// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only message log with platform-level dedupe.
//!
//! The UNIQUE constraint on `(conversation_id, platform_message_id)` makes
//! redelivered platform messages no-ops: `insert_inbound` reports whether
//! the row was new so the caller can skip reprocessing.

use careflow_core::CareflowError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::Message;

/// Record an inbound patient message. Returns `false` when the platform
/// message id was already seen in this conversation.
pub async fn insert_inbound(
    db: &Database,
    conversation_id: i64,
    platform_message_id: &str,
    content: &str,
    intent: Option<&str>,
) -> Result<bool, CareflowError> {
    let platform_message_id = platform_message_id.to_string();
    let content = content.to_string();
    let intent = intent.map(str::to_string);
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO messages
                 (conversation_id, platform_message_id, sender_type, content, intent)
                 VALUES (?1, ?2, 'patient', ?3, ?4)",
                params![conversation_id, platform_message_id, content, intent],
            )?;
            Ok(inserted > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Remove an inbound row so a retried job sees the message as new again.
/// Used to unwind the dedupe marker when a turn fails partway.
pub async fn delete_inbound(
    db: &Database,
    conversation_id: i64,
    platform_message_id: &str,
) -> Result<bool, CareflowError> {
    let platform_message_id = platform_message_id.to_string();
    db.connection()
        .call(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM messages
                 WHERE conversation_id = ?1 AND platform_message_id = ?2
                   AND sender_type = 'patient'",
                params![conversation_id, platform_message_id],
            )?;
            Ok(deleted > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Record an outbound reply sent on the system's behalf.
pub async fn insert_outbound(
    db: &Database,
    conversation_id: i64,
    platform_message_id: &str,
    content: &str,
) -> Result<i64, CareflowError> {
    let platform_message_id = platform_message_id.to_string();
    let content = content.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages
                 (conversation_id, platform_message_id, sender_type, content)
                 VALUES (?1, ?2, 'system', ?3)",
                params![conversation_id, platform_message_id, content],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Recent messages for a conversation, oldest first.
pub async fn recent(
    db: &Database,
    conversation_id: i64,
    limit: u32,
) -> Result<Vec<Message>, CareflowError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, platform_message_id, sender_type,
                        content, intent, created_at
                 FROM (SELECT * FROM messages WHERE conversation_id = ?1
                       ORDER BY id DESC LIMIT ?2)
                 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![conversation_id, limit], |row| {
                Ok(Message {
                    id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    platform_message_id: row.get(2)?,
                    sender_type: row.get(3)?,
                    content: row.get(4)?,
                    intent: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}
