//! Federated speaker projection.
//!
//! A local copy of a directory speaker profile, keyed by the directory's
//! speaker id (unique, never reused). PII columns hold either plaintext or
//! version-marked ciphertext; the repository layer in `lectern-federation`
//! encrypts before write and decrypts after read. `consent_scopes` is the
//! sole authority for what may be synced or shown; an empty list means
//! non-consenting. Rows are never deleted inline on revocation — deletion
//! is deferred to the deadline-driven sweep via `deletion_deadline`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A locally stored federated speaker row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FederatedSpeaker {
    pub id: Uuid,

    /// Directory-assigned speaker id. Unique.
    pub federated_speaker_id: Uuid,

    /// Event this profile was synced for, if scoped to one.
    pub event_id: Option<Uuid>,

    // PII fields (possibly encrypted at rest).
    pub name: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    /// JSON-encoded social link map, treated as one PII string.
    pub social_links: Option<String>,
    pub experience: Option<String>,

    /// Granted consent scopes; empty means non-consenting.
    pub consent_scopes: Vec<String>,

    /// Synced material references (JSON array).
    pub materials: serde_json::Value,

    /// Guest co-speakers recorded as metadata only (JSON array).
    pub guest_co_speakers: serde_json::Value,

    /// When set, the deletion sweep removes this row at/after the deadline.
    pub deletion_deadline: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field set for inserting or rewriting a speaker row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewFederatedSpeaker {
    pub federated_speaker_id: Uuid,
    pub event_id: Option<Uuid>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub social_links: Option<String>,
    pub experience: Option<String>,
    pub consent_scopes: Vec<String>,
    pub materials: serde_json::Value,
    pub guest_co_speakers: serde_json::Value,
}

impl NewFederatedSpeaker {
    /// A minimal placeholder record (empty scopes) for a linked co-speaker.
    #[must_use]
    pub fn placeholder(federated_speaker_id: Uuid, event_id: Option<Uuid>) -> Self {
        Self {
            federated_speaker_id,
            event_id,
            materials: serde_json::Value::Array(Vec::new()),
            guest_co_speakers: serde_json::Value::Array(Vec::new()),
            ..Self::default()
        }
    }
}

impl FederatedSpeaker {
    /// Insert a new speaker row.
    pub async fn create<'e, E>(executor: E, new: &NewFederatedSpeaker) -> Result<Self, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as(
            r#"
            INSERT INTO federated_speakers
                (federated_speaker_id, event_id, name, email, bio, location,
                 company, position, social_links, experience, consent_scopes,
                 materials, guest_co_speakers)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(new.federated_speaker_id)
        .bind(new.event_id)
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.bio)
        .bind(&new.location)
        .bind(&new.company)
        .bind(&new.position)
        .bind(&new.social_links)
        .bind(&new.experience)
        .bind(&new.consent_scopes)
        .bind(&new.materials)
        .bind(&new.guest_co_speakers)
        .fetch_one(executor)
        .await
    }

    /// Rewrite all mutable columns of an existing row.
    pub async fn update<'e, E>(executor: E, row: &FederatedSpeaker) -> Result<Self, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as(
            r#"
            UPDATE federated_speakers
            SET event_id = $2, name = $3, email = $4, bio = $5, location = $6,
                company = $7, position = $8, social_links = $9, experience = $10,
                consent_scopes = $11, materials = $12, guest_co_speakers = $13,
                deletion_deadline = $14, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(row.id)
        .bind(row.event_id)
        .bind(&row.name)
        .bind(&row.email)
        .bind(&row.bio)
        .bind(&row.location)
        .bind(&row.company)
        .bind(&row.position)
        .bind(&row.social_links)
        .bind(&row.experience)
        .bind(&row.consent_scopes)
        .bind(&row.materials)
        .bind(&row.guest_co_speakers)
        .bind(row.deletion_deadline)
        .fetch_one(executor)
        .await
    }

    /// Look up by directory speaker id.
    pub async fn find_by_federated_id<'e, E>(
        executor: E,
        federated_speaker_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as("SELECT * FROM federated_speakers WHERE federated_speaker_id = $1")
            .bind(federated_speaker_id)
            .fetch_optional(executor)
            .await
    }

    /// Look up by local row id.
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as("SELECT * FROM federated_speakers WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// All speakers synced for an event.
    pub async fn list_for_event<'e, E>(executor: E, event_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as(
            "SELECT * FROM federated_speakers WHERE event_id = $1 ORDER BY created_at",
        )
        .bind(event_id)
        .fetch_all(executor)
        .await
    }

    /// All rows, oldest first (bulk encryption migration).
    pub async fn list_all<'e, E>(executor: E) -> Result<Vec<Self>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as("SELECT * FROM federated_speakers ORDER BY created_at")
            .fetch_all(executor)
            .await
    }

    /// Clear consent scopes and set the deletion deadline (revocation).
    pub async fn revoke_consent<'e, E>(
        executor: E,
        federated_speaker_id: Uuid,
        deletion_deadline: Option<DateTime<Utc>>,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as(
            r#"
            UPDATE federated_speakers
            SET consent_scopes = '{}', deletion_deadline = $2, updated_at = now()
            WHERE federated_speaker_id = $1
            RETURNING *
            "#,
        )
        .bind(federated_speaker_id)
        .bind(deletion_deadline)
        .fetch_optional(executor)
        .await
    }

    /// Replace consent scopes.
    pub async fn update_consent_scopes<'e, E>(
        executor: E,
        federated_speaker_id: Uuid,
        scopes: &[String],
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as(
            r#"
            UPDATE federated_speakers
            SET consent_scopes = $2, deletion_deadline = NULL, updated_at = now()
            WHERE federated_speaker_id = $1
            RETURNING *
            "#,
        )
        .bind(federated_speaker_id)
        .bind(scopes)
        .fetch_optional(executor)
        .await
    }

    /// Delete rows whose deletion deadline has passed. Returns rows removed.
    pub async fn delete_past_deadline<'e, E>(
        executor: E,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        let result = sqlx::query(
            "DELETE FROM federated_speakers WHERE deletion_deadline IS NOT NULL AND deletion_deadline <= $1",
        )
        .bind(now)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Count of federated speakers (heartbeat stats).
    pub async fn count<'e, E>(executor: E) -> Result<i64, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_scalar("SELECT COUNT(*) FROM federated_speakers")
            .fetch_one(executor)
            .await
    }
}
