// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Doctor profile, availability window, and blocked-time lookups.

use careflow_core::CareflowError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::{AvailabilityWindow, BlockedTime, Doctor};

fn doctor_from_row(row: &rusqlite::Row<'_>) -> Result<Doctor, rusqlite::Error> {
    Ok(Doctor {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        region: row.get(3)?,
        instagram_page_id: row.get(4)?,
        slot_minutes: row.get(5)?,
        consultation_fee_minor: row.get(6)?,
        currency: row.get(7)?,
    })
}

const DOCTOR_COLS: &str = "id, name, email, region, instagram_page_id,
                           slot_minutes, consultation_fee_minor, currency";

/// Insert a doctor profile. Returns the doctor id.
pub async fn create(
    db: &Database,
    name: &str,
    email: Option<&str>,
    region: &str,
    instagram_page_id: Option<&str>,
    slot_minutes: u32,
    consultation_fee_minor: i64,
    currency: &str,
) -> Result<i64, CareflowError> {
    let name = name.to_string();
    let email = email.map(str::to_string);
    let region = region.to_string();
    let instagram_page_id = instagram_page_id.map(str::to_string);
    let currency = currency.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO doctors
                 (name, email, region, instagram_page_id, slot_minutes,
                  consultation_fee_minor, currency)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    name,
                    email,
                    region,
                    instagram_page_id,
                    slot_minutes,
                    consultation_fee_minor,
                    currency
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: i64) -> Result<Option<Doctor>, CareflowError> {
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {DOCTOR_COLS} FROM doctors WHERE id = ?1");
            let result = conn.query_row(&sql, params![id], doctor_from_row);
            match result {
                Ok(doctor) => Ok(Some(doctor)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Resolve the doctor owning an Instagram page. Inbound message routing
/// depends on this mapping.
pub async fn find_by_instagram_page(
    db: &Database,
    page_id: &str,
) -> Result<Option<Doctor>, CareflowError> {
    let page_id = page_id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {DOCTOR_COLS} FROM doctors WHERE instagram_page_id = ?1");
            let result = conn.query_row(&sql, params![page_id], doctor_from_row);
            match result {
                Ok(doctor) => Ok(Some(doctor)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Add a recurring weekly availability window (weekday 0 = Monday).
pub async fn add_availability(
    db: &Database,
    doctor_id: i64,
    weekday: u8,
    start_time: &str,
    end_time: &str,
) -> Result<i64, CareflowError> {
    let start_time = start_time.to_string();
    let end_time = end_time.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO doctor_availability (doctor_id, weekday, start_time, end_time)
                 VALUES (?1, ?2, ?3, ?4)",
                params![doctor_id, weekday, start_time, end_time],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Availability windows for one weekday, ordered by start time.
pub async fn availability_for_weekday(
    db: &Database,
    doctor_id: i64,
    weekday: u8,
) -> Result<Vec<AvailabilityWindow>, CareflowError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, doctor_id, weekday, start_time, end_time
                 FROM doctor_availability
                 WHERE doctor_id = ?1 AND weekday = ?2
                 ORDER BY start_time ASC",
            )?;
            let rows = stmt.query_map(params![doctor_id, weekday], |row| {
                Ok(AvailabilityWindow {
                    id: row.get(0)?,
                    doctor_id: row.get(1)?,
                    weekday: row.get(2)?,
                    start_time: row.get(3)?,
                    end_time: row.get(4)?,
                })
            })?;
            let mut windows = Vec::new();
            for row in rows {
                windows.push(row?);
            }
            Ok(windows)
        })
        .await
        .map_err(map_tr_err)
}

/// Block a concrete time range (RFC 3339 bounds), overriding availability.
pub async fn add_blocked_time(
    db: &Database,
    doctor_id: i64,
    starts_at: &str,
    ends_at: &str,
) -> Result<i64, CareflowError> {
    let starts_at = starts_at.to_string();
    let ends_at = ends_at.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO blocked_times (doctor_id, starts_at, ends_at)
                 VALUES (?1, ?2, ?3)",
                params![doctor_id, starts_at, ends_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Blocked ranges intersecting `[from, to)`.
pub async fn blocked_times_between(
    db: &Database,
    doctor_id: i64,
    from: &str,
    to: &str,
) -> Result<Vec<BlockedTime>, CareflowError> {
    let from = from.to_string();
    let to = to.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, doctor_id, starts_at, ends_at
                 FROM blocked_times
                 WHERE doctor_id = ?1 AND starts_at < ?3 AND ends_at > ?2
                 ORDER BY starts_at ASC",
            )?;
            let rows = stmt.query_map(params![doctor_id, from, to], |row| {
                Ok(BlockedTime {
                    id: row.get(0)?,
                    doctor_id: row.get(1)?,
                    starts_at: row.get(2)?,
                    ends_at: row.get(3)?,
                })
            })?;
            let mut blocked = Vec::new();
            for row in rows {
                blocked.push(row?);
            }
            Ok(blocked)
        })
        .await
        .map_err(map_tr_err)
}
