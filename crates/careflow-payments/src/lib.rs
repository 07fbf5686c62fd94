// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payment gateway adapters and link issuance.
//!
//! One adapter per gateway behind the [`PaymentGateway`] trait. Gateway
//! choice is a pure function of the doctor's region. Link issuance calls
//! the adapter first and persists the pending payment row only after the
//! gateway succeeds, so there is never a row without an order behind it.

pub mod paypal;
pub mod razorpay;

use careflow_core::{CareflowError, Gateway, PayerInfo, PaymentGateway, PaymentLink};
use careflow_storage::Database;
use careflow_storage::queries::payments;
use tracing::info;

pub use paypal::PaypalGateway;
pub use razorpay::RazorpayGateway;

/// Gateway selection by doctor region. India uses Razorpay, everything
/// else PayPal.
pub fn gateway_for_region(region: &str) -> Gateway {
    if region.eq_ignore_ascii_case("IN") {
        Gateway::Razorpay
    } else {
        Gateway::Paypal
    }
}

/// Create a payment link for an appointment and record the pending
/// payment row keyed by the gateway order id.
pub async fn issue_link(
    db: &Database,
    adapter: &dyn PaymentGateway,
    appointment_id: i64,
    amount_minor: i64,
    currency: &str,
    payer: &PayerInfo,
) -> Result<PaymentLink, CareflowError> {
    let reference_id = format!("appt-{appointment_id}");
    let link = adapter
        .create_link(amount_minor, currency, &reference_id, payer)
        .await?;

    payments::insert_pending(
        db,
        appointment_id,
        &adapter.gateway().to_string(),
        &link.gateway_order_id,
        amount_minor,
        currency,
        &link.url,
    )
    .await?;

    info!(
        appointment_id,
        gateway = %adapter.gateway(),
        order_id = %link.gateway_order_id,
        "payment link issued"
    );
    Ok(link)
}
