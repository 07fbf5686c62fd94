// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation threads and their serialized state.
//!
//! `state` holds the JSON-encoded conversation step plus collected-field
//! flags. PHI values never land here; the ephemeral store holds them
//! until consent.

use careflow_core::CareflowError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::Conversation;

fn conversation_from_row(row: &rusqlite::Row<'_>) -> Result<Conversation, rusqlite::Error> {
    Ok(Conversation {
        id: row.get(0)?,
        doctor_id: row.get(1)?,
        patient_id: row.get(2)?,
        platform: row.get(3)?,
        platform_conversation_id: row.get(4)?,
        status: row.get(5)?,
        state: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

const CONVERSATION_COLS: &str = "id, doctor_id, patient_id, platform,
                                 platform_conversation_id, status, state,
                                 created_at, updated_at";

/// Find the active conversation for `(doctor, platform, thread)`, creating
/// one in the initial state if none exists.
pub async fn find_or_create(
    db: &Database,
    doctor_id: i64,
    patient_id: i64,
    platform: &str,
    platform_conversation_id: &str,
) -> Result<Conversation, CareflowError> {
    let platform = platform.to_string();
    let platform_conversation_id = platform_conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO conversations
                 (doctor_id, patient_id, platform, platform_conversation_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![doctor_id, patient_id, platform, platform_conversation_id],
            )?;
            let sql = format!(
                "SELECT {CONVERSATION_COLS} FROM conversations
                 WHERE doctor_id = ?1 AND platform = ?2 AND platform_conversation_id = ?3"
            );
            Ok(conn.query_row(
                &sql,
                params![doctor_id, platform, platform_conversation_id],
                conversation_from_row,
            )?)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: i64) -> Result<Option<Conversation>, CareflowError> {
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {CONVERSATION_COLS} FROM conversations WHERE id = ?1");
            let result = conn.query_row(&sql, params![id], conversation_from_row);
            match result {
                Ok(conversation) => Ok(Some(conversation)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Persist the serialized conversation state after a turn.
pub async fn update_state(db: &Database, id: i64, state: &str) -> Result<(), CareflowError> {
    let state = state.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations SET state = ?2,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id, state],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Change the thread status ('active', 'archived', 'closed').
pub async fn update_status(db: &Database, id: i64, status: &str) -> Result<(), CareflowError> {
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations SET status = ?2,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id, status],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
