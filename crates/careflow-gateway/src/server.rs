// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook HTTP server built on axum.
//!
//! Sets up routes and shared state. Handlers consume raw bodies because
//! every provider signs the exact bytes it sent.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use careflow_core::{CareflowError, PaymentGateway};
use careflow_storage::Database;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;

/// Shared state for webhook handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub db: Database,
    /// Meta app secret for `X-Hub-Signature-256` verification.
    pub instagram_app_secret: String,
    pub razorpay: Arc<dyn PaymentGateway>,
    pub paypal: Arc<dyn PaymentGateway>,
    /// AES-256 key sealing dead-letter payloads.
    pub dead_letter_key: [u8; 32],
    /// Retry budget stamped onto enqueued jobs.
    pub max_attempts: u32,
    pub start_time: std::time::Instant,
}

/// Server bind configuration (mirrors the `server` config section).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Builds the webhook router. Split out of [`start_server`] so tests can
/// drive it with `tower::ServiceExt::oneshot`.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/webhooks/instagram", post(handlers::post_instagram))
        .route("/webhooks/razorpay", post(handlers::post_razorpay))
        .route("/webhooks/paypal", post(handlers::post_paypal))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds and serves until the shutdown token fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), CareflowError> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CareflowError::Channel {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| CareflowError::Channel {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    Ok(())
}
