// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `careflow serve` command implementation.
//!
//! Wires the whole pipeline: SQLite storage, the webhook gateway, the
//! intent classifier, payment gateway adapters, the Instagram sender, and
//! the queue worker pool. Startup runs crash recovery (requeue stale jobs)
//! and dead-letter retention before accepting traffic. Ctrl-C cancels a
//! shared token that drains the server and workers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use careflow_agent::{Orchestrator, OrchestratorSettings, Worker, WorkerSettings};
use careflow_classifier::{ClassifierSettings, LlmClassifier};
use careflow_config::model::CareflowConfig;
use careflow_core::{
    CareflowError, ChannelSender, IntentClassifier, NotificationSender, PaymentGateway,
};
use careflow_gateway::GatewayState;
use careflow_instagram::InstagramSender;
use careflow_notify::{SmtpNotifier, SmtpSettings};
use careflow_payments::{PaypalGateway, RazorpayGateway};
use careflow_security::crypto;
use careflow_storage::queries::{dead_letters, queue};
use careflow_storage::{Database, RetryPolicy};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Stand-in notifier when no SMTP host is configured. Confirmations are
/// still sent over the chat channel.
struct DisabledNotifier;

#[async_trait]
impl NotificationSender for DisabledNotifier {
    async fn send_email(
        &self,
        to: &str,
        _subject: &str,
        _body: &str,
        correlation_id: &str,
    ) -> bool {
        warn!(to, correlation_id, "email disabled, confirmation not mailed");
        false
    }
}

fn require<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str, CareflowError> {
    value
        .as_deref()
        .ok_or_else(|| CareflowError::Config(format!("{key} is required to serve")))
}

/// Runs the `careflow serve` command.
pub async fn run_serve(config: CareflowConfig) -> Result<(), CareflowError> {
    init_tracing(&config.agent.log_level);

    info!(name = %config.agent.name, "starting careflow serve");

    let db = Database::open(&config.storage.database_path).await?;

    // Crash recovery and retention, before any traffic.
    let requeued = queue::requeue_stale(&db).await?;
    if requeued > 0 {
        info!(requeued, "requeued jobs with lapsed locks");
    }
    let purged =
        dead_letters::purge_expired(&db, config.security.dead_letter_retention_days).await?;
    if purged > 0 {
        info!(purged, "purged expired dead letters");
    }

    let dead_letter_key = crypto::key_from_hex(require(
        &config.security.dead_letter_key,
        "security.dead_letter_key",
    )?)?;

    let channel: Arc<dyn ChannelSender> = Arc::new(InstagramSender::new(require(
        &config.instagram.access_token,
        "instagram.access_token",
    )?)?);

    let classifier: Arc<dyn IntentClassifier> = Arc::new(LlmClassifier::new(
        require(&config.classifier.api_key, "classifier.api_key")?,
        ClassifierSettings {
            model: config.classifier.model.clone(),
            max_tokens: config.classifier.max_tokens,
            cache_capacity: config.classifier.cache_capacity,
            cache_ttl: Duration::from_secs(config.classifier.cache_ttl_secs),
        },
        db.clone(),
    )?);

    let notifier: Arc<dyn NotificationSender> = match &config.email.smtp_host {
        Some(host) => Arc::new(SmtpNotifier::new(&SmtpSettings {
            host: host.clone(),
            port: config.email.smtp_port,
            username: require(&config.email.username, "email.username")?.to_string(),
            password: require(&config.email.password, "email.password")?.to_string(),
            from_address: config.email.from_address.clone(),
        })?),
        None => {
            warn!("email.smtp_host not set, email confirmations disabled");
            Arc::new(DisabledNotifier)
        }
    };

    let razorpay: Arc<dyn PaymentGateway> = Arc::new(RazorpayGateway::new(
        require(&config.razorpay.key_id, "razorpay.key_id")?,
        require(&config.razorpay.key_secret, "razorpay.key_secret")?,
        require(&config.razorpay.webhook_secret, "razorpay.webhook_secret")?,
    )?);
    let paypal: Arc<dyn PaymentGateway> = Arc::new(PaypalGateway::new(
        require(&config.paypal.client_id, "paypal.client_id")?,
        require(&config.paypal.client_secret, "paypal.client_secret")?,
        require(&config.paypal.webhook_secret, "paypal.webhook_secret")?,
    )?);

    let shutdown = CancellationToken::new();

    let state = GatewayState {
        db: db.clone(),
        instagram_app_secret: require(&config.instagram.app_secret, "instagram.app_secret")?
            .to_string(),
        razorpay: razorpay.clone(),
        paypal: paypal.clone(),
        dead_letter_key,
        max_attempts: config.queue.max_attempts,
        start_time: std::time::Instant::now(),
    };
    let server_config = careflow_gateway::ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };
    let server_shutdown = shutdown.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = careflow_gateway::start_server(&server_config, state, server_shutdown).await
        {
            error!(error = %e, "gateway server exited with error");
        }
    });

    let orchestrator = Arc::new(Orchestrator::new(
        db.clone(),
        channel,
        classifier,
        notifier,
        razorpay,
        paypal,
        OrchestratorSettings {
            offer_limit: config.booking.offer_limit,
            ..OrchestratorSettings::default()
        },
    ));

    let worker = Arc::new(Worker::new(
        db.clone(),
        orchestrator.clone(),
        dead_letter_key,
        WorkerSettings {
            concurrency: config.queue.workers,
            poll_interval: Duration::from_millis(500),
            retry: RetryPolicy {
                max_attempts: config.queue.max_attempts,
                backoff_base_secs: config.queue.backoff_base_secs,
                backoff_cap_secs: config.queue.backoff_cap_secs,
            },
        },
    ));
    let worker_handles = worker.spawn(shutdown.clone());

    // Expired pre-consent identity fields get dropped periodically, not
    // only when a conversation touches them.
    let sweep_orchestrator = orchestrator.clone();
    let sweep_shutdown = shutdown.clone();
    let sweep_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            tokio::select! {
                _ = sweep_shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let dropped = sweep_orchestrator.sweep_ephemeral();
                    if dropped > 0 {
                        debug!(dropped, "expired ephemeral identities dropped");
                    }
                }
            }
        }
    });

    info!(
        workers = config.queue.workers,
        "careflow serve running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| CareflowError::Internal(format!("signal handler failed: {e}")))?;
    info!("shutdown signal received, draining");
    shutdown.cancel();

    for handle in worker_handles {
        if let Err(e) = handle.await {
            error!(error = %e, "worker task panicked");
        }
    }
    if let Err(e) = sweep_handle.await {
        error!(error = %e, "sweep task panicked");
    }
    if let Err(e) = server_handle.await {
        error!(error = %e, "server task panicked");
    }

    info!("careflow serve shutdown complete");
    Ok(())
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("careflow={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
