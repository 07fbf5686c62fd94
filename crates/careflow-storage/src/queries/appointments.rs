// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Appointment booking with a check-then-insert race backstop.
//!
//! The partial unique index on `(doctor_id, appointment_date)` for
//! non-cancelled rows serializes concurrent bookings of the same slot;
//! the loser gets a `Conflict` and the orchestrator re-offers slots.

use careflow_core::CareflowError;
use rusqlite::params;

use crate::database::{Database, is_constraint_violation, map_tr_err};
use crate::models::Appointment;

fn appointment_from_row(row: &rusqlite::Row<'_>) -> Result<Appointment, rusqlite::Error> {
    Ok(Appointment {
        id: row.get(0)?,
        doctor_id: row.get(1)?,
        patient_id: row.get(2)?,
        appointment_date: row.get(3)?,
        duration_minutes: row.get(4)?,
        status: row.get(5)?,
        notes: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const APPOINTMENT_COLS: &str = "id, doctor_id, patient_id, appointment_date,
                                duration_minutes, status, notes, created_at";

/// Insert a pending appointment for a slot start (RFC 3339 UTC).
///
/// Returns `Conflict` when another non-cancelled appointment already holds
/// the slot, whether found by the pre-check or by losing the index race.
pub async fn book(
    db: &Database,
    doctor_id: i64,
    patient_id: i64,
    appointment_date: &str,
    duration_minutes: u32,
    notes: Option<&str>,
) -> Result<i64, CareflowError> {
    let appointment_date = appointment_date.to_string();
    let notes = notes.map(str::to_string);
    let result = db
        .connection()
        .call(move |conn| {
            let taken: i64 = conn.query_row(
                "SELECT COUNT(*) FROM appointments
                 WHERE doctor_id = ?1 AND appointment_date = ?2 AND status != 'cancelled'",
                params![doctor_id, appointment_date],
                |row| row.get(0),
            )?;
            if taken > 0 {
                return Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE),
                    Some("slot already booked".into()),
                ));
            }
            conn.execute(
                "INSERT INTO appointments
                 (doctor_id, patient_id, appointment_date, duration_minutes, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![doctor_id, patient_id, appointment_date, duration_minutes, notes],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await;

    match result {
        Ok(id) => Ok(id),
        Err(e) if is_constraint_violation(&e) => Err(CareflowError::Conflict(
            "slot is no longer available".to_string(),
        )),
        Err(e) => Err(map_tr_err(e)),
    }
}

pub async fn get(db: &Database, id: i64) -> Result<Option<Appointment>, CareflowError> {
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {APPOINTMENT_COLS} FROM appointments WHERE id = ?1");
            let result = conn.query_row(&sql, params![id], appointment_from_row);
            match result {
                Ok(appointment) => Ok(Some(appointment)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Non-cancelled slot starts for a doctor within `[from, to)`. Used by
/// slot computation to subtract booked slots.
pub async fn booked_starts_between(
    db: &Database,
    doctor_id: i64,
    from: &str,
    to: &str,
) -> Result<Vec<String>, CareflowError> {
    let from = from.to_string();
    let to = to.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT appointment_date FROM appointments
                 WHERE doctor_id = ?1 AND status != 'cancelled'
                   AND appointment_date >= ?2 AND appointment_date < ?3
                 ORDER BY appointment_date ASC",
            )?;
            let rows = stmt.query_map(params![doctor_id, from, to], |row| row.get(0))?;
            let mut starts = Vec::new();
            for row in rows {
                starts.push(row?);
            }
            Ok(starts)
        })
        .await
        .map_err(map_tr_err)
}

/// Advance an appointment's status ('confirmed', 'cancelled', 'completed').
pub async fn update_status(db: &Database, id: i64, status: &str) -> Result<(), CareflowError> {
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE appointments SET status = ?2 WHERE id = ?1",
                params![id, status],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Cancel every open (pending or confirmed) appointment for a patient.
/// Returns the number of rows cancelled.
pub async fn cancel_open_for_patient(
    db: &Database,
    patient_id: i64,
) -> Result<usize, CareflowError> {
    db.connection()
        .call(move |conn| {
            let cancelled = conn.execute(
                "UPDATE appointments SET status = 'cancelled'
                 WHERE patient_id = ?1 AND status IN ('pending', 'confirmed')",
                params![patient_id],
            )?;
            Ok(cancelled)
        })
        .await
        .map_err(map_tr_err)
}
