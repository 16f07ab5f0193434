//! Background redelivery of queued webhooks.
//!
//! Polls the dead-letter queue for due entries, reattempts each once, and
//! records the outcome. Scheduling lives entirely in `next_retry_at`; the
//! worker never sleeps per entry.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use lectern_db::models::WebhookQueueEntry;
use lectern_db::EventFederationStore;

use crate::dlq::DlqService;
use crate::error::WebhookResult;
use crate::models::WebhookPayload;
use crate::sender::WebhookSender;

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Entries fetched per poll.
const BATCH_SIZE: i64 = 50;

/// Outcome of one poll pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollSummary {
    pub processed: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Retry worker over the webhook queue.
#[derive(Clone)]
pub struct RetryWorker {
    dlq: DlqService,
    sender: WebhookSender,
    events: Arc<dyn EventFederationStore>,
    interval: Duration,
}

impl RetryWorker {
    pub fn new(dlq: DlqService, sender: WebhookSender, events: Arc<dyn EventFederationStore>) -> Self {
        Self {
            dlq,
            sender,
            events,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Poll loop. Runs until the task is dropped.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            target: "lectern::webhooks",
            interval_secs = self.interval.as_secs(),
            "webhook retry worker started"
        );
        loop {
            ticker.tick().await;
            if let Err(error) = self.poll_once().await {
                tracing::error!(
                    target: "lectern::webhooks",
                    error = %error,
                    "webhook retry poll failed"
                );
            }
        }
    }

    /// Process all currently due entries once.
    pub async fn poll_once(&self) -> WebhookResult<PollSummary> {
        let due = self.dlq.get_webhooks_for_retry(BATCH_SIZE).await?;
        let mut summary = PollSummary::default();

        for entry in due {
            summary.processed += 1;
            match self.redeliver(&entry).await {
                Ok(()) => {
                    self.dlq.record_attempt_success(&entry).await?;
                    summary.delivered += 1;
                }
                Err(error) => {
                    self.dlq.record_attempt_failure(&entry, &error).await?;
                    summary.failed += 1;
                }
            }
        }

        if summary.processed > 0 {
            tracing::info!(
                target: "lectern::webhooks",
                processed = summary.processed,
                delivered = summary.delivered,
                failed = summary.failed,
                "webhook retry poll finished"
            );
        }
        Ok(summary)
    }

    /// Reattempt a queued entry once. Returns the error message on failure
    /// so the caller can record it against the entry.
    async fn redeliver(&self, entry: &WebhookQueueEntry) -> Result<(), String> {
        let registration = self
            .events
            .find_by_event(entry.event_id)
            .await
            .map_err(|e| format!("registration lookup failed: {e}"))?
            .ok_or_else(|| format!("event {} is no longer federated", entry.event_id))?;

        let payload: WebhookPayload = serde_json::from_value(entry.payload.clone())
            .map_err(|e| format!("stored payload is malformed: {e}"))?;

        self.sender.deliver_once(&registration, &payload).await
    }
}

/// Spawn the worker on the current runtime.
pub fn spawn_retry_worker(worker: RetryWorker) -> tokio::task::JoinHandle<()> {
    tokio::spawn(worker.run())
}
