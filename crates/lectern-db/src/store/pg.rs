//! Durable Postgres store implementations, delegating to the model layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    EventFederationStore, MessageStore, SpeakerStore, StoreError, WebhookQueueStore,
};
use crate::models::{
    EventFederation, FederatedMessage, FederatedSpeaker, NewFederatedMessage,
    NewFederatedSpeaker, NewWebhookQueueEntry, QueueStats, WebhookQueueEntry,
};

/// Postgres-backed [`SpeakerStore`].
#[derive(Clone)]
pub struct PgSpeakerStore {
    pool: PgPool,
}

impl PgSpeakerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SpeakerStore for PgSpeakerStore {
    async fn create(&self, new: NewFederatedSpeaker) -> Result<FederatedSpeaker, StoreError> {
        Ok(FederatedSpeaker::create(&self.pool, &new).await?)
    }

    async fn update(&self, row: FederatedSpeaker) -> Result<FederatedSpeaker, StoreError> {
        Ok(FederatedSpeaker::update(&self.pool, &row).await?)
    }

    async fn find_by_federated_id(
        &self,
        federated_speaker_id: Uuid,
    ) -> Result<Option<FederatedSpeaker>, StoreError> {
        Ok(FederatedSpeaker::find_by_federated_id(&self.pool, federated_speaker_id).await?)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<FederatedSpeaker>, StoreError> {
        Ok(FederatedSpeaker::find_by_id(&self.pool, id).await?)
    }

    async fn list_for_event(&self, event_id: Uuid) -> Result<Vec<FederatedSpeaker>, StoreError> {
        Ok(FederatedSpeaker::list_for_event(&self.pool, event_id).await?)
    }

    async fn list_all(&self) -> Result<Vec<FederatedSpeaker>, StoreError> {
        Ok(FederatedSpeaker::list_all(&self.pool).await?)
    }

    async fn revoke_consent(
        &self,
        federated_speaker_id: Uuid,
        deletion_deadline: Option<DateTime<Utc>>,
    ) -> Result<Option<FederatedSpeaker>, StoreError> {
        Ok(
            FederatedSpeaker::revoke_consent(&self.pool, federated_speaker_id, deletion_deadline)
                .await?,
        )
    }

    async fn update_consent_scopes(
        &self,
        federated_speaker_id: Uuid,
        scopes: &[String],
    ) -> Result<Option<FederatedSpeaker>, StoreError> {
        Ok(
            FederatedSpeaker::update_consent_scopes(&self.pool, federated_speaker_id, scopes)
                .await?,
        )
    }

    async fn delete_past_deadline(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(FederatedSpeaker::delete_past_deadline(&self.pool, now).await?)
    }
}

/// Postgres-backed [`MessageStore`].
#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn create(&self, new: NewFederatedMessage) -> Result<FederatedMessage, StoreError> {
        Ok(FederatedMessage::create(&self.pool, &new).await?)
    }

    async fn find_by_external_id(
        &self,
        external_message_id: Uuid,
    ) -> Result<Option<FederatedMessage>, StoreError> {
        Ok(FederatedMessage::find_by_external_id(&self.pool, external_message_id).await?)
    }

    async fn mark_read_by_external_id(
        &self,
        external_message_id: Uuid,
    ) -> Result<Option<FederatedMessage>, StoreError> {
        Ok(FederatedMessage::mark_read_by_external_id(&self.pool, external_message_id).await?)
    }
}

/// Postgres-backed [`EventFederationStore`].
#[derive(Clone)]
pub struct PgEventFederationStore {
    pool: PgPool,
}

impl PgEventFederationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventFederationStore for PgEventFederationStore {
    async fn create(
        &self,
        event_id: Uuid,
        federated_event_id: Uuid,
        webhook_url: &str,
        webhook_secret_encrypted: &str,
    ) -> Result<EventFederation, StoreError> {
        Ok(EventFederation::create(
            &self.pool,
            event_id,
            federated_event_id,
            webhook_url,
            webhook_secret_encrypted,
        )
        .await?)
    }

    async fn find_by_event(&self, event_id: Uuid) -> Result<Option<EventFederation>, StoreError> {
        Ok(EventFederation::find_by_event(&self.pool, event_id).await?)
    }

    async fn find_by_federated_event(
        &self,
        federated_event_id: Uuid,
    ) -> Result<Option<EventFederation>, StoreError> {
        Ok(EventFederation::find_by_federated_event(&self.pool, federated_event_id).await?)
    }

    async fn delete(&self, event_id: Uuid) -> Result<bool, StoreError> {
        Ok(EventFederation::delete(&self.pool, event_id).await?)
    }
}

/// Postgres-backed [`WebhookQueueStore`].
#[derive(Clone)]
pub struct PgWebhookQueueStore {
    pool: PgPool,
}

impl PgWebhookQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookQueueStore for PgWebhookQueueStore {
    async fn enqueue(&self, new: NewWebhookQueueEntry) -> Result<WebhookQueueEntry, StoreError> {
        Ok(WebhookQueueEntry::create(&self.pool, &new).await?)
    }

    async fn find(&self, id: Uuid) -> Result<Option<WebhookQueueEntry>, StoreError> {
        Ok(WebhookQueueEntry::find_by_id(&self.pool, id).await?)
    }

    async fn due_for_retry(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<WebhookQueueEntry>, StoreError> {
        Ok(WebhookQueueEntry::due_for_retry(&self.pool, now, limit).await?)
    }

    async fn mark_retry_failed(
        &self,
        id: Uuid,
        attempt: i32,
        last_error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<Option<WebhookQueueEntry>, StoreError> {
        Ok(
            WebhookQueueEntry::mark_retry_failed(&self.pool, id, attempt, last_error, next_retry_at)
                .await?,
        )
    }

    async fn mark_dead_letter(
        &self,
        id: Uuid,
        attempt: i32,
        last_error: &str,
    ) -> Result<Option<WebhookQueueEntry>, StoreError> {
        Ok(WebhookQueueEntry::mark_dead_letter(&self.pool, id, attempt, last_error).await?)
    }

    async fn mark_success(
        &self,
        id: Uuid,
        attempt: i32,
    ) -> Result<Option<WebhookQueueEntry>, StoreError> {
        Ok(WebhookQueueEntry::mark_success(&self.pool, id, attempt).await?)
    }

    async fn reset_for_retry(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<WebhookQueueEntry>, StoreError> {
        Ok(WebhookQueueEntry::reset_for_retry(&self.pool, id, now).await?)
    }

    async fn list_dead_letters(&self, limit: i64) -> Result<Vec<WebhookQueueEntry>, StoreError> {
        Ok(WebhookQueueEntry::list_dead_letters(&self.pool, limit).await?)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(WebhookQueueEntry::delete(&self.pool, id).await?)
    }

    async fn cleanup(
        &self,
        success_before: DateTime<Utc>,
        dead_letter_before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(WebhookQueueEntry::cleanup(&self.pool, success_before, dead_letter_before).await?)
    }

    async fn stats(&self) -> Result<QueueStats, StoreError> {
        Ok(WebhookQueueEntry::stats(&self.pool).await?)
    }

    fn is_durable(&self) -> bool {
        true
    }
}
