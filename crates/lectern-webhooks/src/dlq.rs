//! Dead-letter queue for failed webhook deliveries.
//!
//! Entries move through a small state machine: `pending_retry` until a
//! retry succeeds (`success`) or attempts reach the maximum
//! (`dead_letter`). Dead-letter entries wait for manual replay; terminal
//! entries are purged after fixed retention windows.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;

use lectern_db::models::{NewWebhookQueueEntry, QueueStats, WebhookQueueEntry};
use lectern_db::WebhookQueueStore;

use crate::error::{WebhookError, WebhookResult};
use crate::models::{WebhookEventType, WebhookPayload};

/// Maximum delivery attempts before an entry goes to dead-letter.
pub const MAX_DELIVERY_ATTEMPTS: i32 = 5;

/// Base backoff delay.
const BACKOFF_BASE_SECS: i64 = 1;

/// Backoff cap.
const BACKOFF_CAP_SECS: i64 = 3600;

/// Retention for delivered entries.
const SUCCESS_RETENTION: Duration = Duration::hours(24);

/// Retention for dead-letter entries.
const DEAD_LETTER_RETENTION: Duration = Duration::days(7);

/// Exponential backoff delay for a given attempt (1-based), without
/// jitter: `min(1s * 2^(attempt-1), 1h)`.
#[must_use]
pub fn backoff_delay(attempt: i32) -> Duration {
    let exponent = (attempt - 1).clamp(0, 62) as u32;
    let secs = BACKOFF_BASE_SECS
        .checked_shl(exponent)
        .unwrap_or(BACKOFF_CAP_SECS)
        .min(BACKOFF_CAP_SECS);
    Duration::seconds(secs)
}

/// Due time for the next retry: backoff plus up to 10% jitter, so bursts
/// of failures do not retry in lockstep.
#[must_use]
pub fn next_retry_at(attempt: i32, now: DateTime<Utc>) -> DateTime<Utc> {
    let delay = backoff_delay(attempt);
    let jitter_cap_ms = delay.num_milliseconds() / 10;
    let jitter_ms = if jitter_cap_ms > 0 {
        rand::thread_rng().gen_range(0..=jitter_cap_ms)
    } else {
        0
    };
    now + delay + Duration::milliseconds(jitter_ms)
}

/// Dead-letter queue service over a [`WebhookQueueStore`].
#[derive(Clone)]
pub struct DlqService {
    store: Arc<dyn WebhookQueueStore>,
}

impl DlqService {
    /// Build the service. Logs a warning when backed by a non-durable
    /// store, since entries then vanish on restart.
    pub fn new(store: Arc<dyn WebhookQueueStore>) -> Self {
        if !store.is_durable() {
            tracing::warn!(
                target: "lectern::webhooks",
                "webhook queue store is not durable; entries will not survive restarts"
            );
        }
        Self { store }
    }

    /// Record a payload whose initial delivery (including the sender's
    /// inline retries) failed. The entry enters the queue at attempt 1
    /// with its first retry due after the base backoff.
    pub async fn record_failure(
        &self,
        event_id: Uuid,
        event_type: WebhookEventType,
        payload: &WebhookPayload,
        webhook_url: &str,
        last_error: &str,
    ) -> WebhookResult<WebhookQueueEntry> {
        let payload_json = serde_json::to_value(payload)
            .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

        let entry = self
            .store
            .enqueue(NewWebhookQueueEntry {
                event_id,
                event_type: event_type.as_str().to_string(),
                payload: payload_json,
                webhook_url: webhook_url.to_string(),
                last_error: Some(last_error.to_string()),
                next_retry_at: Some(next_retry_at(1, Utc::now())),
            })
            .await?;

        tracing::warn!(
            target: "lectern::webhooks",
            entry_id = %entry.id,
            event_id = %event_id,
            event_type = %event_type,
            error = last_error,
            "webhook delivery queued for retry"
        );
        Ok(entry)
    }

    /// Due pending entries, oldest first.
    pub async fn get_webhooks_for_retry(&self, limit: i64) -> WebhookResult<Vec<WebhookQueueEntry>> {
        Ok(self.store.due_for_retry(Utc::now(), limit).await?)
    }

    /// Record a failed retry attempt, promoting to dead-letter once
    /// attempts reach the maximum.
    pub async fn record_attempt_failure(
        &self,
        entry: &WebhookQueueEntry,
        error: &str,
    ) -> WebhookResult<()> {
        let attempt = entry.attempt + 1;

        if attempt >= MAX_DELIVERY_ATTEMPTS {
            self.store.mark_dead_letter(entry.id, attempt, error).await?;
            tracing::error!(
                target: "lectern::webhooks",
                entry_id = %entry.id,
                event_id = %entry.event_id,
                attempt,
                error,
                "webhook moved to dead-letter after exhausting retries"
            );
        } else {
            let due = next_retry_at(attempt, Utc::now());
            self.store
                .mark_retry_failed(entry.id, attempt, error, due)
                .await?;
            tracing::warn!(
                target: "lectern::webhooks",
                entry_id = %entry.id,
                attempt,
                next_retry_at = %due,
                error,
                "webhook retry failed, rescheduled"
            );
        }
        Ok(())
    }

    /// Record a successful retry.
    pub async fn record_attempt_success(&self, entry: &WebhookQueueEntry) -> WebhookResult<()> {
        self.store.mark_success(entry.id, entry.attempt + 1).await?;
        tracing::info!(
            target: "lectern::webhooks",
            entry_id = %entry.id,
            event_id = %entry.event_id,
            attempt = entry.attempt + 1,
            "webhook delivered from retry queue"
        );
        Ok(())
    }

    /// Manually reset a dead-letter entry for an immediate retry.
    pub async fn retry_dead_letter_webhook(&self, id: Uuid) -> WebhookResult<WebhookQueueEntry> {
        self.store
            .reset_for_retry(id, Utc::now())
            .await?
            .ok_or(WebhookError::QueueEntryNotFound)
    }

    /// Dead-letter entries, newest first.
    pub async fn get_dead_letter_webhooks(&self, limit: i64) -> WebhookResult<Vec<WebhookQueueEntry>> {
        Ok(self.store.list_dead_letters(limit).await?)
    }

    /// Delete a queue entry.
    pub async fn delete_webhook(&self, id: Uuid) -> WebhookResult<()> {
        if self.store.delete(id).await? {
            Ok(())
        } else {
            Err(WebhookError::QueueEntryNotFound)
        }
    }

    /// Purge terminal entries past their retention windows. Returns rows
    /// removed.
    pub async fn cleanup_old_webhooks(&self) -> WebhookResult<u64> {
        let now = Utc::now();
        let removed = self
            .store
            .cleanup(now - SUCCESS_RETENTION, now - DEAD_LETTER_RETENTION)
            .await?;
        if removed > 0 {
            tracing::info!(
                target: "lectern::webhooks",
                removed,
                "purged old webhook queue entries"
            );
        }
        Ok(removed)
    }

    /// Aggregate queue counts.
    pub async fn get_queue_stats(&self) -> WebhookResult<QueueStats> {
        Ok(self.store.stats().await?)
    }
}
