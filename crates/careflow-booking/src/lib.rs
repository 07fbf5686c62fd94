// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Slot computation and appointment booking.
//!
//! `available_slots` assembles the offerable starts for a date from the
//! doctor's recurring windows, blocked ranges, and existing bookings.
//! `book_slot` inserts the appointment; a lost race surfaces as
//! [`CareflowError::Conflict`] and the orchestrator re-offers.

pub mod slots;

use careflow_core::CareflowError;
use careflow_storage::queries::{appointments, doctors};
use careflow_storage::{Database, Doctor};
use chrono::{Datelike, NaiveDate};
use tracing::debug;

pub use slots::compute_slots;

/// Offerable slot starts for a doctor on a date, capped at `limit`.
pub async fn available_slots(
    db: &Database,
    doctor: &Doctor,
    date: NaiveDate,
    limit: usize,
) -> Result<Vec<String>, CareflowError> {
    let weekday = date.weekday().num_days_from_monday() as u8;

    let windows = doctors::availability_for_weekday(db, doctor.id, weekday).await?;
    let day_start = format!("{date}T00:00:00.000Z");
    let day_end = format!(
        "{}T00:00:00.000Z",
        date.succ_opt()
            .ok_or_else(|| CareflowError::Validation("date out of range".into()))?
    );
    let blocked = doctors::blocked_times_between(db, doctor.id, &day_start, &day_end).await?;
    let booked =
        appointments::booked_starts_between(db, doctor.id, &day_start, &day_end).await?;

    let slot_minutes = u32::try_from(doctor.slot_minutes)
        .map_err(|_| CareflowError::Validation("doctor slot_minutes out of range".into()))?;
    let slots = compute_slots(date, &windows, &blocked, &booked, slot_minutes, limit)?;
    debug!(doctor_id = doctor.id, %date, count = slots.len(), "computed available slots");
    Ok(slots)
}

/// Book a slot start for a patient. Returns the appointment id, or
/// `Conflict` when the slot was taken between offer and acceptance.
pub async fn book_slot(
    db: &Database,
    doctor: &Doctor,
    patient_id: i64,
    slot_start: &str,
) -> Result<i64, CareflowError> {
    let slot_minutes = u32::try_from(doctor.slot_minutes)
        .map_err(|_| CareflowError::Validation("doctor slot_minutes out of range".into()))?;
    let id = appointments::book(db, doctor.id, patient_id, slot_start, slot_minutes, None).await?;
    debug!(doctor_id = doctor.id, appointment_id = id, slot = slot_start, "slot booked");
    Ok(id)
}
