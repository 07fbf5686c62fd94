// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only audit trail. Entries carry metadata only, never message
//! content or PHI.

use careflow_core::CareflowError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::AuditEntry;

/// Append an audit record. `metadata` is a JSON object string.
pub async fn record(
    db: &Database,
    event_type: &str,
    correlation_id: Option<&str>,
    metadata: serde_json::Value,
) -> Result<i64, CareflowError> {
    let event_type = event_type.to_string();
    let correlation_id = correlation_id.map(str::to_string);
    let metadata = metadata.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO audit_log (event_type, correlation_id, metadata)
                 VALUES (?1, ?2, ?3)",
                params![event_type, correlation_id, metadata],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent entries for a correlation id, newest first.
pub async fn for_correlation(
    db: &Database,
    correlation_id: &str,
    limit: u32,
) -> Result<Vec<AuditEntry>, CareflowError> {
    let correlation_id = correlation_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, event_type, correlation_id, metadata, created_at
                 FROM audit_log WHERE correlation_id = ?1
                 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![correlation_id, limit], |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    event_type: row.get(1)?,
                    correlation_id: row.get(2)?,
                    metadata: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?);
            }
            Ok(entries)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("audit_test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn records_and_reads_by_correlation() {
        let (db, _dir) = setup_db().await;

        record(
            &db,
            "webhook_received",
            Some("corr-1"),
            json!({"provider": "instagram", "event_id": "evt-1"}),
        )
        .await
        .unwrap();
        record(
            &db,
            "classification",
            Some("corr-1"),
            json!({"model": "gpt-4o-mini", "total_tokens": 42, "redacted": true}),
        )
        .await
        .unwrap();
        record(&db, "webhook_received", Some("corr-other"), json!({}))
            .await
            .unwrap();

        let entries = for_correlation(&db, "corr-1", 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        // Newest first.
        assert_eq!(entries[0].event_type, "classification");
        assert_eq!(entries[1].event_type, "webhook_received");
    }
}
