//! Webhook delivery queue (dead-letter queue) model.
//!
//! A row is created on the first failed delivery of a payload and mutated
//! per retry. Invariants: `attempt` strictly increases while the entry is
//! `pending_retry`, and `next_retry_at` is NULL whenever the status is not
//! `pending_retry`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Queue entry lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting for the next scheduled retry.
    PendingRetry,
    /// Retries exhausted; held for manual intervention.
    DeadLetter,
    /// Delivered; kept briefly for observability, then purged.
    Success,
}

impl QueueStatus {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingRetry => "pending_retry",
            Self::DeadLetter => "dead_letter",
            Self::Success => "success",
        }
    }

    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_retry" => Some(Self::PendingRetry),
            "dead_letter" => Some(Self::DeadLetter),
            "success" => Some(Self::Success),
            _ => None,
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A queued webhook delivery failure.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookQueueEntry {
    pub id: Uuid,
    pub event_id: Uuid,
    pub event_type: String,

    /// The signed envelope as it was built for the original delivery.
    pub payload: serde_json::Value,

    pub webhook_url: String,

    /// Delivery attempts performed so far (>= 1).
    pub attempt: i32,

    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// Due time of the next retry; NULL unless `status = pending_retry`.
    pub next_retry_at: Option<DateTime<Utc>>,

    /// `pending_retry`, `dead_letter`, or `success`.
    pub status: String,

    pub created_at: DateTime<Utc>,
}

impl WebhookQueueEntry {
    /// Parsed status, defaulting unknown strings to dead-letter.
    #[must_use]
    pub fn queue_status(&self) -> QueueStatus {
        QueueStatus::parse(&self.status).unwrap_or(QueueStatus::DeadLetter)
    }
}

/// Field set for enqueuing a failed delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWebhookQueueEntry {
    pub event_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub webhook_url: String,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Aggregate queue counts for the admin surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending_retry: i64,
    pub dead_letter: i64,
    pub success: i64,
    /// Due time of the oldest pending entry, if any.
    pub oldest_pending: Option<DateTime<Utc>>,
}

impl WebhookQueueEntry {
    /// Insert a fresh entry (first failure, attempt = 1).
    pub async fn create<'e, E>(executor: E, new: &NewWebhookQueueEntry) -> Result<Self, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as(
            r#"
            INSERT INTO webhook_queue
                (event_id, event_type, payload, webhook_url, attempt,
                 last_error, last_attempt_at, next_retry_at, status)
            VALUES ($1, $2, $3, $4, 1, $5, now(), $6, 'pending_retry')
            RETURNING *
            "#,
        )
        .bind(new.event_id)
        .bind(&new.event_type)
        .bind(&new.payload)
        .bind(&new.webhook_url)
        .bind(&new.last_error)
        .bind(new.next_retry_at)
        .fetch_one(executor)
        .await
    }

    /// Look up an entry by id.
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as("SELECT * FROM webhook_queue WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Due pending entries, oldest first.
    pub async fn due_for_retry<'e, E>(
        executor: E,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as(
            r#"
            SELECT * FROM webhook_queue
            WHERE status = 'pending_retry' AND next_retry_at <= $1
            ORDER BY next_retry_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(executor)
        .await
    }

    /// Record a failed retry: bump attempt, reschedule.
    pub async fn mark_retry_failed<'e, E>(
        executor: E,
        id: Uuid,
        attempt: i32,
        last_error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as(
            r#"
            UPDATE webhook_queue
            SET attempt = $2, last_error = $3, last_attempt_at = now(),
                next_retry_at = $4, status = 'pending_retry'
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(attempt)
        .bind(last_error)
        .bind(next_retry_at)
        .fetch_optional(executor)
        .await
    }

    /// Promote an exhausted entry to dead-letter (`next_retry_at` cleared).
    pub async fn mark_dead_letter<'e, E>(
        executor: E,
        id: Uuid,
        attempt: i32,
        last_error: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as(
            r#"
            UPDATE webhook_queue
            SET attempt = $2, last_error = $3, last_attempt_at = now(),
                next_retry_at = NULL, status = 'dead_letter'
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(attempt)
        .bind(last_error)
        .fetch_optional(executor)
        .await
    }

    /// Record a successful retry (`next_retry_at` cleared).
    pub async fn mark_success<'e, E>(
        executor: E,
        id: Uuid,
        attempt: i32,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as(
            r#"
            UPDATE webhook_queue
            SET attempt = $2, last_error = NULL, last_attempt_at = now(),
                next_retry_at = NULL, status = 'success'
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(attempt)
        .fetch_optional(executor)
        .await
    }

    /// Manually reset a dead-letter entry for an immediate retry.
    pub async fn reset_for_retry<'e, E>(
        executor: E,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as(
            r#"
            UPDATE webhook_queue
            SET attempt = 0, last_error = NULL, next_retry_at = $2,
                status = 'pending_retry'
            WHERE id = $1 AND status = 'dead_letter'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(executor)
        .await
    }

    /// Dead-letter entries, newest first.
    pub async fn list_dead_letters<'e, E>(executor: E, limit: i64) -> Result<Vec<Self>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as(
            r#"
            SELECT * FROM webhook_queue
            WHERE status = 'dead_letter'
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(executor)
        .await
    }

    /// Delete an entry.
    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        let result = sqlx::query("DELETE FROM webhook_queue WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Purge terminal entries past their retention windows.
    pub async fn cleanup<'e, E>(
        executor: E,
        success_before: DateTime<Utc>,
        dead_letter_before: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        let result = sqlx::query(
            r#"
            DELETE FROM webhook_queue
            WHERE (status = 'success' AND created_at < $1)
               OR (status = 'dead_letter' AND created_at < $2)
            "#,
        )
        .bind(success_before)
        .bind(dead_letter_before)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Aggregate queue counts.
    pub async fn stats<'e, E>(executor: E) -> Result<QueueStats, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres> + Copy,
    {
        let (pending_retry, dead_letter, success, oldest_pending): (
            i64,
            i64,
            i64,
            Option<DateTime<Utc>>,
        ) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending_retry'),
                COUNT(*) FILTER (WHERE status = 'dead_letter'),
                COUNT(*) FILTER (WHERE status = 'success'),
                MIN(next_retry_at) FILTER (WHERE status = 'pending_retry')
            FROM webhook_queue
            "#,
        )
        .fetch_one(executor)
        .await?;

        Ok(QueueStats {
            pending_retry,
            dead_letter,
            success,
            oldest_pending,
        })
    }
}
