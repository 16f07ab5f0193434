//! Persisted federation state.
//!
//! A singleton row holding the last validated license snapshot, warnings,
//! and feature flags. The state service falls back to this row when the
//! directory cannot be reached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The singleton federation settings row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FederationSettings {
    /// Always 1; the table holds a single row.
    pub id: i32,

    /// Whether federation is administratively enabled.
    pub enabled: bool,

    /// Last successfully validated license, as returned by the directory.
    pub license_snapshot: Option<serde_json::Value>,

    /// Warnings surfaced to the admin UI (JSON array of strings).
    pub warnings: serde_json::Value,

    /// Feature flags from the license (JSON object of name -> bool).
    pub features: serde_json::Value,

    /// When the license was last successfully validated.
    pub last_validated: Option<DateTime<Utc>>,

    /// When the last heartbeat was accepted by the directory.
    pub last_heartbeat: Option<DateTime<Utc>>,

    pub updated_at: DateTime<Utc>,
}

impl FederationSettings {
    /// Fetch the settings row, inserting the default row if absent.
    pub async fn get_or_default<'e, E>(executor: E) -> Result<Self, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as(
            r#"
            INSERT INTO federation_settings (id)
            VALUES (1)
            ON CONFLICT (id) DO UPDATE SET id = federation_settings.id
            RETURNING *
            "#,
        )
        .fetch_one(executor)
        .await
    }

    /// Persist a successful validation snapshot.
    pub async fn save_snapshot<'e, E>(
        executor: E,
        license_snapshot: &serde_json::Value,
        warnings: &serde_json::Value,
        features: &serde_json::Value,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as(
            r#"
            UPDATE federation_settings
            SET license_snapshot = $1,
                warnings = $2,
                features = $3,
                last_validated = now(),
                updated_at = now()
            WHERE id = 1
            RETURNING *
            "#,
        )
        .bind(license_snapshot)
        .bind(warnings)
        .bind(features)
        .fetch_one(executor)
        .await
    }

    /// Enable or disable federation.
    pub async fn set_enabled<'e, E>(executor: E, enabled: bool) -> Result<Self, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as(
            r#"
            UPDATE federation_settings
            SET enabled = $1, updated_at = now()
            WHERE id = 1
            RETURNING *
            "#,
        )
        .bind(enabled)
        .fetch_one(executor)
        .await
    }

    /// Record an accepted heartbeat, replacing stored warnings.
    pub async fn record_heartbeat<'e, E>(
        executor: E,
        warnings: &serde_json::Value,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as(
            r#"
            UPDATE federation_settings
            SET last_heartbeat = now(), warnings = $1, updated_at = now()
            WHERE id = 1
            RETURNING *
            "#,
        )
        .bind(warnings)
        .fetch_one(executor)
        .await
    }

    /// Warnings as a string vector.
    #[must_use]
    pub fn warning_list(&self) -> Vec<String> {
        serde_json::from_value(self.warnings.clone()).unwrap_or_default()
    }
}
