// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook ingestion handlers.
//!
//! The ingestion contract per provider: verify the signature over the raw
//! body, derive a stable event id, gate on the idempotency store, enqueue
//! a job envelope, and acknowledge. A storage failure on the idempotency
//! check fails open (the queue dedupes again downstream); a failed enqueue
//! dead-letters the sealed payload and still acknowledges, so the provider
//! stops redelivering an event we have already captured.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use careflow_core::{EventStatus, JobEnvelope, Provider};
use careflow_instagram::webhook;
use careflow_security::signature;
use careflow_storage::queries::{audit, dead_letters, events, queue};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::server::GatewayState;

pub use careflow_core::WEBHOOK_QUEUE;

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// POST /webhooks/instagram
pub async fn post_instagram(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(sig) = header_str(&headers, "x-hub-signature-256") else {
        return unauthorized(&state, Provider::Instagram, "missing signature header").await;
    };
    if !webhook::verify_signature(&state.instagram_app_secret, &body, sig) {
        return unauthorized(&state, Provider::Instagram, "signature mismatch").await;
    }

    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return (StatusCode::BAD_REQUEST, Json(AckResponse { status: "malformed" }))
            .into_response();
    };

    let event_id = webhook::derive_event_id(&payload, &body);
    ingest(&state, Provider::Instagram, &event_id, &body, payload).await
}

/// POST /webhooks/razorpay
pub async fn post_razorpay(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let adapter = state.razorpay.clone();
    let Some(sig) = header_str(&headers, "x-razorpay-signature") else {
        return unauthorized(&state, Provider::Razorpay, "missing signature header").await;
    };
    if !adapter.verify_webhook(sig, &body) {
        return unauthorized(&state, Provider::Razorpay, "signature mismatch").await;
    }

    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return (StatusCode::BAD_REQUEST, Json(AckResponse { status: "malformed" }))
            .into_response();
    };

    let event_id = adapter
        .extract_event_id(&payload)
        .unwrap_or_else(|| signature::sha256_hex(&body));
    ingest(&state, Provider::Razorpay, &event_id, &body, payload).await
}

/// POST /webhooks/paypal
pub async fn post_paypal(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let adapter = state.paypal.clone();
    let Some(sig) = header_str(&headers, "x-webhook-signature") else {
        return unauthorized(&state, Provider::Paypal, "missing signature header").await;
    };
    if !adapter.verify_webhook(sig, &body) {
        return unauthorized(&state, Provider::Paypal, "signature mismatch").await;
    }

    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return (StatusCode::BAD_REQUEST, Json(AckResponse { status: "malformed" }))
            .into_response();
    };

    let event_id = adapter
        .extract_event_id(&payload)
        .unwrap_or_else(|| signature::sha256_hex(&body));
    ingest(&state, Provider::Paypal, &event_id, &body, payload).await
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn unauthorized(state: &GatewayState, provider: Provider, reason: &str) -> Response {
    warn!(provider = %provider, reason, "webhook rejected");
    record_audit(
        state,
        "webhook_rejected",
        None,
        json!({"provider": provider.to_string(), "reason": reason}),
    )
    .await;
    (
        StatusCode::UNAUTHORIZED,
        Json(AckResponse { status: "rejected" }),
    )
        .into_response()
}

/// Shared ingestion path after signature verification.
async fn ingest(
    state: &GatewayState,
    provider: Provider,
    event_id: &str,
    raw_body: &[u8],
    payload: serde_json::Value,
) -> Response {
    let correlation_id = uuid::Uuid::new_v4().to_string();

    // Idempotency gate. A lookup failure must not drop the event, so it
    // fails open and the message-level dedupe catches any repeat.
    match events::check_status(&state.db, event_id, provider).await {
        Ok(Some(EventStatus::Pending)) => {
            // A pending event should have a live queue job. When the job
            // is missing (crash between mark-pending and enqueue), the
            // redelivery refills the queue instead of being swallowed.
            match queue::has_live_job(&state.db, WEBHOOK_QUEUE, event_id).await {
                Ok(true) => {
                    info!(event_id, provider = %provider, "duplicate webhook, job still queued");
                    record_audit(
                        state,
                        "webhook_duplicate",
                        Some(&correlation_id),
                        json!({"provider": provider.to_string(), "event_id": event_id}),
                    )
                    .await;
                    return (StatusCode::OK, Json(AckResponse { status: "duplicate" }))
                        .into_response();
                }
                Ok(false) => {
                    warn!(event_id, provider = %provider, "pending event lost its job, re-enqueueing");
                }
                Err(e) => {
                    warn!(event_id, error = %e, "live-job lookup failed, continuing open");
                }
            }
        }
        Ok(Some(status)) => {
            info!(event_id, provider = %provider, status = %status, "duplicate webhook");
            record_audit(
                state,
                "webhook_duplicate",
                Some(&correlation_id),
                json!({"provider": provider.to_string(), "event_id": event_id}),
            )
            .await;
            return (StatusCode::OK, Json(AckResponse { status: "duplicate" })).into_response();
        }
        Ok(None) => {}
        Err(e) => {
            warn!(event_id, error = %e, "idempotency check failed, continuing open");
        }
    }

    if let Err(e) = events::mark_pending(&state.db, event_id, provider).await {
        warn!(event_id, error = %e, "failed to mark event pending, continuing");
    }

    let envelope = JobEnvelope {
        event_id: event_id.to_string(),
        provider,
        payload,
        correlation_id: correlation_id.clone(),
        timestamp: Utc::now(),
    };
    let envelope_json = match serde_json::to_string(&envelope) {
        Ok(s) => s,
        Err(e) => {
            return dead_letter(state, provider, event_id, raw_body, &e.to_string()).await;
        }
    };

    match queue::enqueue(&state.db, WEBHOOK_QUEUE, &envelope_json, state.max_attempts).await {
        Ok(job_id) => {
            info!(event_id, provider = %provider, job_id, "webhook accepted");
            record_audit(
                state,
                "webhook_received",
                Some(&correlation_id),
                json!({
                    "provider": provider.to_string(),
                    "event_id": event_id,
                    "job_id": job_id,
                }),
            )
            .await;
            (StatusCode::OK, Json(AckResponse { status: "accepted" })).into_response()
        }
        Err(e) => dead_letter(state, provider, event_id, raw_body, &e.to_string()).await,
    }
}

/// Enqueue failure fallback: seal the payload, mark the event failed, and
/// still acknowledge so the provider stops retrying an event we hold.
async fn dead_letter(
    state: &GatewayState,
    provider: Provider,
    event_id: &str,
    raw_body: &[u8],
    error_message: &str,
) -> Response {
    warn!(event_id, provider = %provider, error = error_message, "enqueue failed, dead-lettering");

    if let Err(e) = dead_letters::store_dead_letter(
        &state.db,
        &state.dead_letter_key,
        event_id,
        provider,
        raw_body,
        error_message,
        0,
    )
    .await
    {
        warn!(event_id, error = %e, "dead-letter store failed");
    }
    if let Err(e) = events::mark_failed(&state.db, event_id, provider, 0).await {
        warn!(event_id, error = %e, "failed to mark event failed");
    }
    record_audit(
        state,
        "webhook_dead_lettered",
        None,
        json!({"provider": provider.to_string(), "event_id": event_id}),
    )
    .await;

    (StatusCode::OK, Json(AckResponse { status: "accepted" })).into_response()
}

async fn record_audit(
    state: &GatewayState,
    event_type: &str,
    correlation_id: Option<&str>,
    metadata: serde_json::Value,
) {
    if let Err(e) = audit::record(&state.db, event_type, correlation_id, metadata).await {
        warn!(event_type, error = %e, "audit record failed");
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use careflow_core::{CareflowError, Gateway, PayerInfo, PaymentGateway, PaymentLink};
    use tempfile::tempdir;
    use tower::ServiceExt;

    use super::*;
    use crate::server::{GatewayState, build_router};
    use careflow_storage::Database;

    const APP_SECRET: &str = "test-app-secret";

    struct HmacOnlyGateway {
        gateway: Gateway,
        secret: String,
    }

    #[async_trait]
    impl PaymentGateway for HmacOnlyGateway {
        fn gateway(&self) -> Gateway {
            self.gateway
        }

        async fn create_link(
            &self,
            _amount_minor: i64,
            _currency: &str,
            _reference_id: &str,
            _payer: &PayerInfo,
        ) -> Result<PaymentLink, CareflowError> {
            unreachable!("ingestion tests never create links")
        }

        fn verify_webhook(&self, sig: &str, raw_body: &[u8]) -> bool {
            signature::verify_hmac_sha256(&self.secret, raw_body, sig)
        }

        fn extract_event_id(&self, body: &serde_json::Value) -> Option<String> {
            body.get("event_id").and_then(|v| v.as_str()).map(str::to_string)
        }
    }

    async fn setup() -> (axum::Router, Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("gateway_test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let state = GatewayState {
            db: db.clone(),
            instagram_app_secret: APP_SECRET.to_string(),
            razorpay: Arc::new(HmacOnlyGateway {
                gateway: Gateway::Razorpay,
                secret: "rzp-secret".into(),
            }),
            paypal: Arc::new(HmacOnlyGateway {
                gateway: Gateway::Paypal,
                secret: "pp-secret".into(),
            }),
            dead_letter_key: [9u8; 32],
            max_attempts: 3,
            start_time: std::time::Instant::now(),
        };
        (build_router(state), db, dir)
    }

    fn instagram_body() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "object": "instagram",
            "entry": [{
                "id": "page-1",
                "messaging": [{
                    "sender": {"id": "user-9"},
                    "message": {"mid": "mid.777", "text": "I want to book"},
                }],
            }],
        }))
        .unwrap()
    }

    fn signed_instagram_request(body: &[u8]) -> Request<Body> {
        let sig = format!("sha256={}", signature::sign_hmac_sha256(APP_SECRET, body));
        Request::builder()
            .method("POST")
            .uri("/webhooks/instagram")
            .header("x-hub-signature-256", sig)
            .header("content-type", "application/json")
            .body(Body::from(body.to_vec()))
            .unwrap()
    }

    async fn body_status(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        value["status"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let (app, _db, _dir) = setup().await;
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["status"], "ok");
    }

    #[tokio::test]
    async fn valid_webhook_is_enqueued_and_marked_pending() {
        let (app, db, _dir) = setup().await;
        let body = instagram_body();

        let response = app.oneshot(signed_instagram_request(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_status(response).await, "accepted");

        let status = events::check_status(&db, "mid.777", Provider::Instagram)
            .await
            .unwrap();
        assert_eq!(status, Some(EventStatus::Pending));

        let entry = queue::dequeue(&db, WEBHOOK_QUEUE).await.unwrap().unwrap();
        let envelope: JobEnvelope = serde_json::from_str(&entry.payload).unwrap();
        assert_eq!(envelope.event_id, "mid.777");
        assert_eq!(envelope.provider, Provider::Instagram);
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_without_side_effects() {
        let (app, db, _dir) = setup().await;
        let body = instagram_body();

        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/instagram")
            .header("x-hub-signature-256", "sha256=deadbeef")
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        assert!(
            events::check_status(&db, "mid.777", Provider::Instagram)
                .await
                .unwrap()
                .is_none()
        );
        assert!(queue::dequeue(&db, WEBHOOK_QUEUE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_signature_header_is_rejected() {
        let (app, _db, _dir) = setup().await;
        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/instagram")
            .body(Body::from(instagram_body()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn duplicate_webhook_acks_without_second_enqueue() {
        let (app, db, _dir) = setup().await;
        let body = instagram_body();

        let first = app
            .clone()
            .oneshot(signed_instagram_request(&body))
            .await
            .unwrap();
        assert_eq!(body_status(first).await, "accepted");

        let second = app.oneshot(signed_instagram_request(&body)).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(body_status(second).await, "duplicate");

        // Exactly one job in the queue.
        assert!(queue::dequeue(&db, WEBHOOK_QUEUE).await.unwrap().is_some());
        assert!(queue::dequeue(&db, WEBHOOK_QUEUE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pending_event_without_a_job_is_enqueued_again() {
        let (app, db, _dir) = setup().await;
        let body = instagram_body();

        // Event marked pending but never enqueued, as after a crash
        // between the two steps.
        events::mark_pending(&db, "mid.777", Provider::Instagram)
            .await
            .unwrap();
        assert!(queue::dequeue(&db, WEBHOOK_QUEUE).await.unwrap().is_none());

        let response = app.oneshot(signed_instagram_request(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_status(response).await, "accepted");

        let entry = queue::dequeue(&db, WEBHOOK_QUEUE).await.unwrap().unwrap();
        let envelope: JobEnvelope = serde_json::from_str(&entry.payload).unwrap();
        assert_eq!(envelope.event_id, "mid.777");
    }

    #[tokio::test]
    async fn razorpay_webhook_uses_its_own_signature_scheme() {
        let (app, db, _dir) = setup().await;
        let body = serde_json::to_vec(&json!({
            "event_id": "evt_rzp_1",
            "event": "payment_link.paid",
        }))
        .unwrap();
        let sig = signature::sign_hmac_sha256("rzp-secret", &body);

        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/razorpay")
            .header("x-razorpay-signature", sig)
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let status = events::check_status(&db, "evt_rzp_1", Provider::Razorpay)
            .await
            .unwrap();
        assert_eq!(status, Some(EventStatus::Pending));
    }

    #[tokio::test]
    async fn paypal_event_id_falls_back_to_body_hash() {
        let (app, db, _dir) = setup().await;
        // No "event_id" and the fake adapter reads only that key.
        let body = serde_json::to_vec(&json!({"event_type": "PAYMENT.CAPTURE.COMPLETED"})).unwrap();
        let sig = signature::sign_hmac_sha256("pp-secret", &body);

        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/paypal")
            .header("x-webhook-signature", sig)
            .body(Body::from(body.clone()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let expected = signature::sha256_hex(&body);
        let status = events::check_status(&db, &expected, Provider::Paypal)
            .await
            .unwrap();
        assert_eq!(status, Some(EventStatus::Pending));
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let (app, _db, _dir) = setup().await;
        let body = b"not json at all".to_vec();
        let response = app.oneshot(signed_instagram_request(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn provider_strings_round_trip() {
        for provider in [Provider::Instagram, Provider::Razorpay, Provider::Paypal] {
            let s = provider.to_string();
            assert_eq!(Provider::from_str(&s).unwrap(), provider);
        }
    }
}
