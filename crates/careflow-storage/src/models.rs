// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types for storage entities.
//!
//! Timestamps are RFC 3339 UTC strings, matching the SQLite defaults.
//! Statuses are stored as the snake_case strings of the corresponding
//! `careflow-core` enums.

use serde::{Deserialize, Serialize};

/// Idempotency record for an inbound webhook event.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: i64,
    pub event_id: String,
    pub provider: String,
    pub status: String,
    pub retry_count: i64,
    pub received_at: String,
}

/// Terminal sink row for an event that exhausted retries (payload sealed
/// with AES-256-GCM before insert).
#[derive(Debug, Clone)]
pub struct DeadLetterRecord {
    pub id: i64,
    pub event_id: String,
    pub provider: String,
    pub nonce: Vec<u8>,
    pub payload: Vec<u8>,
    pub error_message: String,
    pub retry_count: i64,
    pub failed_at: String,
}

/// Durable job queue entry.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: i64,
    pub queue_name: String,
    pub payload: String,
    pub status: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub available_at: String,
    pub locked_until: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A tenant doctor with platform identity and billing defaults.
#[derive(Debug, Clone)]
pub struct Doctor {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub region: String,
    pub instagram_page_id: Option<String>,
    pub slot_minutes: i64,
    pub consultation_fee_minor: i64,
    pub currency: String,
}

/// One recurring weekly availability window.
#[derive(Debug, Clone)]
pub struct AvailabilityWindow {
    pub id: i64,
    pub doctor_id: i64,
    /// 0 = Monday .. 6 = Sunday (chrono `weekday().num_days_from_monday()`).
    pub weekday: i64,
    /// "HH:MM" local clock time.
    pub start_time: String,
    pub end_time: String,
}

/// An ad-hoc blocked range overriding availability.
#[derive(Debug, Clone)]
pub struct BlockedTime {
    pub id: i64,
    pub doctor_id: i64,
    pub starts_at: String,
    pub ends_at: String,
}

/// Patient identity. All identity fields are `None` until consent is
/// granted; pre-consent rows are placeholders keyed by platform identity.
#[derive(Debug, Clone)]
pub struct Patient {
    pub id: i64,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub consent_status: String,
    pub platform: Option<String>,
    pub platform_external_id: Option<String>,
    pub created_at: String,
}

/// A conversation thread between a doctor and a patient on one platform.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: i64,
    pub doctor_id: i64,
    pub patient_id: i64,
    pub platform: String,
    pub platform_conversation_id: String,
    pub status: String,
    /// JSON-serialized conversation state: step + collected-field flags.
    /// Never raw PHI values.
    pub state: String,
    pub created_at: String,
    pub updated_at: String,
}

/// One message in a conversation. Append-only.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub platform_message_id: String,
    pub sender_type: String,
    pub content: String,
    pub intent: Option<String>,
    pub created_at: String,
}

/// A booked (or attempted) appointment slot.
#[derive(Debug, Clone)]
pub struct Appointment {
    pub id: i64,
    pub doctor_id: i64,
    pub patient_id: i64,
    pub appointment_date: String,
    pub duration_minutes: i64,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: String,
}

/// Payment row created pending at link-issue time; advanced only by
/// gateway webhook confirmation matched on `gateway_order_id`.
#[derive(Debug, Clone)]
pub struct Payment {
    pub id: i64,
    pub appointment_id: i64,
    pub gateway: String,
    pub gateway_order_id: String,
    pub status: String,
    pub amount_minor: i64,
    pub currency: String,
    pub link_url: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Append-only audit trail entry. Metadata only, never payload content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub event_type: String,
    pub correlation_id: Option<String>,
    pub metadata: String,
    pub created_at: String,
}
