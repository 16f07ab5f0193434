//! Per-event federation registration.
//!
//! Created when an event is registered with the directory; holds the
//! directory-assigned event id, the URL outbound webhooks are POSTed to,
//! and the AES-GCM-encrypted webhook secret.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A local event's registration with the directory.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EventFederation {
    pub event_id: Uuid,

    /// Directory-assigned identifier for this event.
    pub federated_event_id: Uuid,

    /// Directory endpoint receiving this event's outbound webhooks.
    pub webhook_url: String,

    /// Webhook signing secret, encrypted at rest.
    pub webhook_secret_encrypted: String,

    pub registered_at: DateTime<Utc>,
}

impl EventFederation {
    /// Record a new registration.
    pub async fn create<'e, E>(
        executor: E,
        event_id: Uuid,
        federated_event_id: Uuid,
        webhook_url: &str,
        webhook_secret_encrypted: &str,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as(
            r#"
            INSERT INTO event_federation
                (event_id, federated_event_id, webhook_url, webhook_secret_encrypted)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(federated_event_id)
        .bind(webhook_url)
        .bind(webhook_secret_encrypted)
        .fetch_one(executor)
        .await
    }

    /// Look up a registration by local event id.
    pub async fn find_by_event<'e, E>(
        executor: E,
        event_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as("SELECT * FROM event_federation WHERE event_id = $1")
            .bind(event_id)
            .fetch_optional(executor)
            .await
    }

    /// Look up a registration by directory-assigned event id.
    pub async fn find_by_federated_event<'e, E>(
        executor: E,
        federated_event_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as("SELECT * FROM event_federation WHERE federated_event_id = $1")
            .bind(federated_event_id)
            .fetch_optional(executor)
            .await
    }

    /// Remove a registration after unregistering with the directory.
    pub async fn delete<'e, E>(executor: E, event_id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        let result = sqlx::query("DELETE FROM event_federation WHERE event_id = $1")
            .bind(event_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
