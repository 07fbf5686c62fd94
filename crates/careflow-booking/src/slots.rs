// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pure slot arithmetic: availability windows minus blocked ranges minus
//! booked starts.
//!
//! Slots are fixed-duration, aligned to the window start, and expressed
//! as RFC 3339 UTC strings matching the storage format. A day with no
//! windows yields an empty list, not an error.

use careflow_core::CareflowError;
use careflow_storage::{AvailabilityWindow, BlockedTime};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

fn parse_clock(value: &str) -> Result<NaiveTime, CareflowError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|e| CareflowError::Validation(format!("bad availability time '{value}': {e}")))
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>, CareflowError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CareflowError::Validation(format!("bad timestamp '{value}': {e}")))
}

/// Storage timestamp format for a slot start.
pub fn format_slot(start: DateTime<Utc>) -> String {
    start.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Compute the offerable slot starts for one date.
///
/// Walks each availability window in `slot_minutes` steps and keeps a
/// start when the full slot fits in the window, does not intersect a
/// blocked range, and its start is not already booked. Results are
/// chronological and capped at `limit`.
pub fn compute_slots(
    date: NaiveDate,
    windows: &[AvailabilityWindow],
    blocked: &[BlockedTime],
    booked_starts: &[String],
    slot_minutes: u32,
    limit: usize,
) -> Result<Vec<String>, CareflowError> {
    if slot_minutes == 0 {
        return Err(CareflowError::Validation("slot_minutes must be positive".into()));
    }
    let step = Duration::minutes(i64::from(slot_minutes));

    let blocked_ranges: Vec<(DateTime<Utc>, DateTime<Utc>)> = blocked
        .iter()
        .map(|b| Ok((parse_instant(&b.starts_at)?, parse_instant(&b.ends_at)?)))
        .collect::<Result<_, CareflowError>>()?;

    let mut slots = Vec::new();
    for window in windows {
        let open = date.and_time(parse_clock(&window.start_time)?).and_utc();
        let close = date.and_time(parse_clock(&window.end_time)?).and_utc();

        let mut start = open;
        while start + step <= close {
            if slots.len() >= limit {
                return Ok(slots);
            }
            let end = start + step;
            let is_blocked = blocked_ranges
                .iter()
                .any(|(b_start, b_end)| start < *b_end && end > *b_start);
            let slot = format_slot(start);
            if !is_blocked && !booked_starts.contains(&slot) {
                slots.push(slot);
            }
            start = end;
        }
    }
    Ok(slots)
}
