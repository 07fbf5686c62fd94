// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue worker pool.
//!
//! Each worker polls the durable queue, hands decoded envelopes to the
//! orchestrator, and closes the job out: ack plus `processed` on success,
//! backoff on retryable failure, sealed dead letter plus `failed` once
//! retries are exhausted or the error is permanent.

use std::sync::Arc;
use std::time::Duration;

use careflow_core::{CareflowError, JobEnvelope, WEBHOOK_QUEUE};
use careflow_storage::queries::{audit, dead_letters, events, queue};
use careflow_storage::{Database, QueueEntry, RetryPolicy};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::orchestrator::Orchestrator;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Number of concurrent worker tasks.
    pub concurrency: usize,
    /// Idle poll interval when the queue is empty.
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_millis(500),
            retry: RetryPolicy::default(),
        }
    }
}

pub struct Worker {
    db: Database,
    orchestrator: Arc<Orchestrator>,
    dead_letter_key: [u8; 32],
    settings: WorkerSettings,
}

impl Worker {
    pub fn new(
        db: Database,
        orchestrator: Arc<Orchestrator>,
        dead_letter_key: [u8; 32],
        settings: WorkerSettings,
    ) -> Self {
        Self {
            db,
            orchestrator,
            dead_letter_key,
            settings,
        }
    }

    /// Spawn the worker tasks. They drain until `shutdown` fires; an entry
    /// already claimed finishes its attempt before the task exits.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        (0..self.settings.concurrency)
            .map(|worker_id| {
                let worker = Arc::clone(&self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    worker.run_loop(worker_id, shutdown).await;
                })
            })
            .collect()
    }

    async fn run_loop(&self, worker_id: usize, shutdown: CancellationToken) {
        info!(worker_id, "worker started");
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            match queue::dequeue(&self.db, WEBHOOK_QUEUE).await {
                Ok(Some(entry)) => {
                    if let Err(e) = self.handle_entry(&entry).await {
                        error!(worker_id, entry_id = entry.id, error = %e, "job bookkeeping failed");
                    }
                }
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.settings.poll_interval) => {}
                    }
                }
                Err(e) => {
                    warn!(worker_id, error = %e, "dequeue failed, backing off");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.settings.poll_interval) => {}
                    }
                }
            }
        }
        info!(worker_id, "worker stopped");
    }

    /// Run one claimed queue entry through the orchestrator and record
    /// the outcome.
    async fn handle_entry(&self, entry: &QueueEntry) -> Result<(), CareflowError> {
        let envelope: JobEnvelope = match serde_json::from_str(&entry.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                // No provider or event id to dead-letter under; the raw
                // payload stays on the failed queue row for inspection.
                error!(entry_id = entry.id, error = %e, "undecodable queue payload");
                queue::fail(&self.db, entry.id, false, self.settings.retry).await?;
                audit::record(
                    &self.db,
                    "queue_payload_undecodable",
                    None,
                    json!({"entry_id": entry.id, "error": e.to_string()}),
                )
                .await?;
                return Ok(());
            }
        };

        match self.orchestrator.process(&envelope).await {
            Ok(()) => {
                queue::ack(&self.db, entry.id).await?;
                events::mark_processed(&self.db, &envelope.event_id, envelope.provider).await?;
                debug!(
                    entry_id = entry.id,
                    event_id = %envelope.event_id,
                    correlation_id = %envelope.correlation_id,
                    "job processed"
                );
                Ok(())
            }
            Err(e) => {
                let retryable = e.is_retryable();
                let (status, attempts) =
                    queue::fail(&self.db, entry.id, retryable, self.settings.retry).await?;
                warn!(
                    entry_id = entry.id,
                    event_id = %envelope.event_id,
                    correlation_id = %envelope.correlation_id,
                    attempts,
                    retryable,
                    error = %e,
                    "job attempt failed"
                );
                if status == "failed" {
                    self.dead_letter(&envelope, &e, attempts).await?;
                }
                Ok(())
            }
        }
    }

    async fn dead_letter(
        &self,
        envelope: &JobEnvelope,
        cause: &CareflowError,
        attempts: u32,
    ) -> Result<(), CareflowError> {
        let raw = serde_json::to_vec(&envelope.payload)
            .map_err(|e| CareflowError::Internal(format!("payload re-serialization: {e}")))?;
        dead_letters::store_dead_letter(
            &self.db,
            &self.dead_letter_key,
            &envelope.event_id,
            envelope.provider,
            &raw,
            &cause.to_string(),
            attempts,
        )
        .await?;
        events::mark_failed(&self.db, &envelope.event_id, envelope.provider, attempts).await?;
        audit::record(
            &self.db,
            "job_dead_lettered",
            Some(&envelope.correlation_id),
            json!({
                "event_id": envelope.event_id,
                "provider": envelope.provider.to_string(),
                "attempts": attempts,
                "error": cause.to_string(),
            }),
        )
        .await?;
        error!(
            event_id = %envelope.event_id,
            attempts,
            "job dead-lettered"
        );
        Ok(())
    }
}
