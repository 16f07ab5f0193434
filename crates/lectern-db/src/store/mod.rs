//! Repository-trait seam over the federation tables.
//!
//! Services depend on these traits rather than on a concrete database. Each
//! trait has a durable Postgres implementation ([`pg`]) and an in-memory
//! implementation ([`memory`]); the implementation is chosen once at service
//! construction. The in-memory webhook queue store is the explicitly
//! non-durable fallback: it keeps queue semantics but does not survive a
//! process restart.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    EventFederation, FederatedMessage, FederatedSpeaker, NewFederatedMessage,
    NewFederatedSpeaker, NewWebhookQueueEntry, QueueStats, WebhookQueueEntry,
};

pub use memory::{
    MemoryEventFederationStore, MemoryMessageStore, MemorySpeakerStore, MemoryWebhookQueueStore,
};
pub use pg::{PgEventFederationStore, PgMessageStore, PgSpeakerStore, PgWebhookQueueStore};

/// Errors surfaced by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Store for federated speaker rows.
#[async_trait]
pub trait SpeakerStore: Send + Sync {
    async fn create(&self, new: NewFederatedSpeaker) -> Result<FederatedSpeaker, StoreError>;

    /// Rewrite all mutable columns of an existing row.
    async fn update(&self, row: FederatedSpeaker) -> Result<FederatedSpeaker, StoreError>;

    async fn find_by_federated_id(
        &self,
        federated_speaker_id: Uuid,
    ) -> Result<Option<FederatedSpeaker>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<FederatedSpeaker>, StoreError>;

    async fn list_for_event(&self, event_id: Uuid) -> Result<Vec<FederatedSpeaker>, StoreError>;

    async fn list_all(&self) -> Result<Vec<FederatedSpeaker>, StoreError>;

    /// Clear scopes and stamp the deletion deadline. Returns the updated row
    /// if the speaker exists.
    async fn revoke_consent(
        &self,
        federated_speaker_id: Uuid,
        deletion_deadline: Option<DateTime<Utc>>,
    ) -> Result<Option<FederatedSpeaker>, StoreError>;

    async fn update_consent_scopes(
        &self,
        federated_speaker_id: Uuid,
        scopes: &[String],
    ) -> Result<Option<FederatedSpeaker>, StoreError>;

    /// Delete rows whose deletion deadline has passed. Returns rows removed.
    async fn delete_past_deadline(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Store for submission-thread messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create(&self, new: NewFederatedMessage) -> Result<FederatedMessage, StoreError>;

    async fn find_by_external_id(
        &self,
        external_message_id: Uuid,
    ) -> Result<Option<FederatedMessage>, StoreError>;

    async fn mark_read_by_external_id(
        &self,
        external_message_id: Uuid,
    ) -> Result<Option<FederatedMessage>, StoreError>;
}

/// Store for per-event federation registrations.
#[async_trait]
pub trait EventFederationStore: Send + Sync {
    async fn create(
        &self,
        event_id: Uuid,
        federated_event_id: Uuid,
        webhook_url: &str,
        webhook_secret_encrypted: &str,
    ) -> Result<EventFederation, StoreError>;

    async fn find_by_event(&self, event_id: Uuid) -> Result<Option<EventFederation>, StoreError>;

    async fn find_by_federated_event(
        &self,
        federated_event_id: Uuid,
    ) -> Result<Option<EventFederation>, StoreError>;

    async fn delete(&self, event_id: Uuid) -> Result<bool, StoreError>;
}

/// Store for the webhook delivery queue.
///
/// Implementations must preserve the entry state machine: `attempt`
/// strictly increases while `pending_retry`, and `next_retry_at` is `None`
/// in every other status.
#[async_trait]
pub trait WebhookQueueStore: Send + Sync {
    /// Insert a fresh entry for a first delivery failure (attempt = 1).
    async fn enqueue(&self, new: NewWebhookQueueEntry) -> Result<WebhookQueueEntry, StoreError>;

    async fn find(&self, id: Uuid) -> Result<Option<WebhookQueueEntry>, StoreError>;

    /// Due pending entries, oldest first.
    async fn due_for_retry(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<WebhookQueueEntry>, StoreError>;

    async fn mark_retry_failed(
        &self,
        id: Uuid,
        attempt: i32,
        last_error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<Option<WebhookQueueEntry>, StoreError>;

    async fn mark_dead_letter(
        &self,
        id: Uuid,
        attempt: i32,
        last_error: &str,
    ) -> Result<Option<WebhookQueueEntry>, StoreError>;

    async fn mark_success(
        &self,
        id: Uuid,
        attempt: i32,
    ) -> Result<Option<WebhookQueueEntry>, StoreError>;

    /// Manual dead-letter replay: attempt = 0, due immediately.
    async fn reset_for_retry(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<WebhookQueueEntry>, StoreError>;

    async fn list_dead_letters(&self, limit: i64) -> Result<Vec<WebhookQueueEntry>, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Purge terminal entries past their retention windows. Returns rows removed.
    async fn cleanup(
        &self,
        success_before: DateTime<Utc>,
        dead_letter_before: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn stats(&self) -> Result<QueueStats, StoreError>;

    /// Whether entries survive a process restart.
    fn is_durable(&self) -> bool;
}
