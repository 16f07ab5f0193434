//! Submission-thread messages exchanged over federation.
//!
//! Inbound `message.sent` webhooks are deduplicated on
//! `external_message_id`, which is unique when present.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Direction of a message relative to this instance.
pub mod direction {
    /// Written by an organizer on this instance.
    pub const ORGANIZER: &str = "organizer";
    /// Written by a speaker (usually arriving via federation).
    pub const SPEAKER: &str = "speaker";
}

/// A message on a submission thread.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FederatedMessage {
    pub id: Uuid,
    pub event_id: Uuid,
    pub submission_id: Option<Uuid>,

    /// Directory-side message id; the idempotency key for inbound delivery.
    pub external_message_id: Option<Uuid>,

    /// `organizer` or `speaker`.
    pub direction: String,

    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Field set for inserting a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFederatedMessage {
    pub event_id: Uuid,
    pub submission_id: Option<Uuid>,
    pub external_message_id: Option<Uuid>,
    pub direction: String,
    pub body: String,
}

impl FederatedMessage {
    /// Insert a new message.
    pub async fn create<'e, E>(executor: E, new: &NewFederatedMessage) -> Result<Self, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as(
            r#"
            INSERT INTO federated_messages
                (event_id, submission_id, external_message_id, direction, body)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(new.event_id)
        .bind(new.submission_id)
        .bind(new.external_message_id)
        .bind(&new.direction)
        .bind(&new.body)
        .fetch_one(executor)
        .await
    }

    /// Look up a message by local id.
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as("SELECT * FROM federated_messages WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Look up a message by the directory-side id.
    pub async fn find_by_external_id<'e, E>(
        executor: E,
        external_message_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as("SELECT * FROM federated_messages WHERE external_message_id = $1")
            .bind(external_message_id)
            .fetch_optional(executor)
            .await
    }

    /// Mark a message read by its directory-side id.
    pub async fn mark_read_by_external_id<'e, E>(
        executor: E,
        external_message_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as(
            r#"
            UPDATE federated_messages
            SET read_at = COALESCE(read_at, now())
            WHERE external_message_id = $1
            RETURNING *
            "#,
        )
        .bind(external_message_id)
        .fetch_optional(executor)
        .await
    }
}
