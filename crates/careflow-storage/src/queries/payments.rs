// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payment rows. Created pending at link-issue time and advanced only by
//! gateway webhook confirmation matched on `(gateway, gateway_order_id)`.

use careflow_core::CareflowError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::Payment;

fn payment_from_row(row: &rusqlite::Row<'_>) -> Result<Payment, rusqlite::Error> {
    Ok(Payment {
        id: row.get(0)?,
        appointment_id: row.get(1)?,
        gateway: row.get(2)?,
        gateway_order_id: row.get(3)?,
        status: row.get(4)?,
        amount_minor: row.get(5)?,
        currency: row.get(6)?,
        link_url: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

const PAYMENT_COLS: &str = "id, appointment_id, gateway, gateway_order_id, status,
                            amount_minor, currency, link_url, created_at, updated_at";

/// Record a pending payment for an issued link.
pub async fn insert_pending(
    db: &Database,
    appointment_id: i64,
    gateway: &str,
    gateway_order_id: &str,
    amount_minor: i64,
    currency: &str,
    link_url: &str,
) -> Result<i64, CareflowError> {
    let gateway = gateway.to_string();
    let gateway_order_id = gateway_order_id.to_string();
    let currency = currency.to_string();
    let link_url = link_url.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO payments
                 (appointment_id, gateway, gateway_order_id, amount_minor, currency, link_url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    appointment_id,
                    gateway,
                    gateway_order_id,
                    amount_minor,
                    currency,
                    link_url
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Find a payment by its gateway order reference.
pub async fn find_by_order(
    db: &Database,
    gateway: &str,
    gateway_order_id: &str,
) -> Result<Option<Payment>, CareflowError> {
    let gateway = gateway.to_string();
    let gateway_order_id = gateway_order_id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {PAYMENT_COLS} FROM payments
                 WHERE gateway = ?1 AND gateway_order_id = ?2"
            );
            let result = conn.query_row(&sql, params![gateway, gateway_order_id], payment_from_row);
            match result {
                Ok(payment) => Ok(Some(payment)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Advance a pending payment on webhook confirmation. Returns the updated
/// payment, or `None` when no pending row matches (unknown order, or a
/// redelivered confirmation that already applied).
pub async fn mark_status_by_order(
    db: &Database,
    gateway: &str,
    gateway_order_id: &str,
    status: &str,
) -> Result<Option<Payment>, CareflowError> {
    let gateway = gateway.to_string();
    let gateway_order_id = gateway_order_id.to_string();
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            let updated = conn.execute(
                "UPDATE payments SET status = ?3,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE gateway = ?1 AND gateway_order_id = ?2 AND status = 'pending'",
                params![gateway, gateway_order_id, status],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            let sql = format!(
                "SELECT {PAYMENT_COLS} FROM payments
                 WHERE gateway = ?1 AND gateway_order_id = ?2"
            );
            Ok(Some(conn.query_row(
                &sql,
                params![gateway, gateway_order_id],
                payment_from_row,
            )?))
        })
        .await
        .map_err(map_tr_err)
}

/// The newest pending payment link for a patient, used to resend the
/// link on a payment query.
pub async fn latest_pending_link_for_patient(
    db: &Database,
    patient_id: i64,
) -> Result<Option<String>, CareflowError> {
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT p.link_url FROM payments p
                 JOIN appointments a ON a.id = p.appointment_id
                 WHERE a.patient_id = ?1 AND p.status = 'pending'
                 ORDER BY p.id DESC LIMIT 1",
                params![patient_id],
                |row| row.get(0),
            );
            match result {
                Ok(url) => Ok(Some(url)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}
