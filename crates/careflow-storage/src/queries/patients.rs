// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Patient identity operations, gated on consent.
//!
//! A patient row is created as a placeholder keyed by platform identity
//! the first time a message arrives. Name, phone, and email may only be
//! written through `persist_identity`, which refuses unless consent has
//! been granted.

use careflow_core::CareflowError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::Patient;

fn patient_from_row(row: &rusqlite::Row<'_>) -> Result<Patient, rusqlite::Error> {
    Ok(Patient {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        email: row.get(3)?,
        consent_status: row.get(4)?,
        platform: row.get(5)?,
        platform_external_id: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const PATIENT_COLS: &str = "id, name, phone, email, consent_status,
                            platform, platform_external_id, created_at";

/// Find the patient for a platform identity, creating a consent-pending
/// placeholder if none exists.
pub async fn find_or_create_placeholder(
    db: &Database,
    platform: &str,
    platform_external_id: &str,
) -> Result<Patient, CareflowError> {
    let platform = platform.to_string();
    let platform_external_id = platform_external_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO patients (platform, platform_external_id)
                 VALUES (?1, ?2)",
                params![platform, platform_external_id],
            )?;
            let sql = format!(
                "SELECT {PATIENT_COLS} FROM patients
                 WHERE platform = ?1 AND platform_external_id = ?2"
            );
            Ok(conn.query_row(
                &sql,
                params![platform, platform_external_id],
                patient_from_row,
            )?)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: i64) -> Result<Option<Patient>, CareflowError> {
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {PATIENT_COLS} FROM patients WHERE id = ?1");
            let result = conn.query_row(&sql, params![id], patient_from_row);
            match result {
                Ok(patient) => Ok(Some(patient)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Record an explicit consent grant.
pub async fn grant_consent(db: &Database, id: i64) -> Result<(), CareflowError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE patients SET consent_status = 'granted' WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record a consent refusal or revocation.
pub async fn revoke_consent(db: &Database, id: i64) -> Result<(), CareflowError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE patients SET consent_status = 'revoked' WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Write identity fields for a consented patient.
///
/// Returns `Unauthorized` without touching the row when consent has not
/// been granted. This is the single write path for patient PHI.
pub async fn persist_identity(
    db: &Database,
    id: i64,
    name: &str,
    phone: &str,
    email: Option<&str>,
) -> Result<(), CareflowError> {
    let name = name.to_string();
    let phone = phone.to_string();
    let email = email.map(str::to_string);
    let updated = db
        .connection()
        .call(move |conn| {
            Ok(conn.execute(
                "UPDATE patients SET name = ?2, phone = ?3, email = ?4
                 WHERE id = ?1 AND consent_status = 'granted'",
                params![id, name, phone, email],
            )?)
        })
        .await
        .map_err(map_tr_err)?;

    if updated == 0 {
        return Err(CareflowError::Unauthorized(format!(
            "patient {id} has not granted consent; identity not persisted"
        )));
    }
    Ok(())
}
