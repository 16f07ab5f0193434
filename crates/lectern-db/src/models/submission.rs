//! Slim submission model.
//!
//! Submission CRUD lives outside this subsystem; the webhook senders only
//! need to resolve a submission, check that it is federated, and count rows
//! for heartbeat stats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A talk submission, as the federation subsystem sees it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub event_id: Uuid,
    pub title: String,
    pub status: String,

    /// True when the submission originated via federation.
    pub is_federated: bool,

    pub created_at: DateTime<Utc>,
}

impl Submission {
    /// Look up a submission by id.
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as("SELECT * FROM submissions WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Count of submissions (heartbeat stats).
    pub async fn count<'e, E>(executor: E) -> Result<i64, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_scalar("SELECT COUNT(*) FROM submissions")
            .fetch_one(executor)
            .await
    }

    /// Count of distinct events with submissions (heartbeat stats).
    pub async fn count_events<'e, E>(executor: E) -> Result<i64, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_scalar("SELECT COUNT(DISTINCT event_id) FROM submissions")
            .fetch_one(executor)
            .await
    }
}
