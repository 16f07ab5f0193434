//! In-memory store implementations.
//!
//! Used as the test substrate and as the webhook queue's non-durable
//! fallback when no database pool is available. Uniqueness constraints of
//! the schema (`federated_speaker_id`, `external_message_id`,
//! `federated_event_id`) are enforced to match Postgres behavior.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    EventFederationStore, MessageStore, SpeakerStore, StoreError, WebhookQueueStore,
};
use crate::models::{
    EventFederation, FederatedMessage, FederatedSpeaker, NewFederatedMessage,
    NewFederatedSpeaker, NewWebhookQueueEntry, QueueStats, QueueStatus, WebhookQueueEntry,
};

/// In-memory [`SpeakerStore`].
#[derive(Clone, Default)]
pub struct MemorySpeakerStore {
    rows: Arc<RwLock<HashMap<Uuid, FederatedSpeaker>>>,
}

impl MemorySpeakerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SpeakerStore for MemorySpeakerStore {
    async fn create(&self, new: NewFederatedSpeaker) -> Result<FederatedSpeaker, StoreError> {
        let mut rows = self.rows.write().await;
        if rows
            .values()
            .any(|r| r.federated_speaker_id == new.federated_speaker_id)
        {
            return Err(StoreError::Conflict(format!(
                "federated speaker {} already exists",
                new.federated_speaker_id
            )));
        }
        let now = Utc::now();
        let row = FederatedSpeaker {
            id: Uuid::new_v4(),
            federated_speaker_id: new.federated_speaker_id,
            event_id: new.event_id,
            name: new.name,
            email: new.email,
            bio: new.bio,
            location: new.location,
            company: new.company,
            position: new.position,
            social_links: new.social_links,
            experience: new.experience,
            consent_scopes: new.consent_scopes,
            materials: new.materials,
            guest_co_speakers: new.guest_co_speakers,
            deletion_deadline: None,
            created_at: now,
            updated_at: now,
        };
        rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update(&self, mut row: FederatedSpeaker) -> Result<FederatedSpeaker, StoreError> {
        let mut rows = self.rows.write().await;
        if !rows.contains_key(&row.id) {
            return Err(StoreError::Conflict(format!("speaker {} not found", row.id)));
        }
        row.updated_at = Utc::now();
        rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_by_federated_id(
        &self,
        federated_speaker_id: Uuid,
    ) -> Result<Option<FederatedSpeaker>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|r| r.federated_speaker_id == federated_speaker_id)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<FederatedSpeaker>, StoreError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn list_for_event(&self, event_id: Uuid) -> Result<Vec<FederatedSpeaker>, StoreError> {
        let rows = self.rows.read().await;
        let mut out: Vec<_> = rows
            .values()
            .filter(|r| r.event_id == Some(event_id))
            .cloned()
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    async fn list_all(&self) -> Result<Vec<FederatedSpeaker>, StoreError> {
        let rows = self.rows.read().await;
        let mut out: Vec<_> = rows.values().cloned().collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    async fn revoke_consent(
        &self,
        federated_speaker_id: Uuid,
        deletion_deadline: Option<DateTime<Utc>>,
    ) -> Result<Option<FederatedSpeaker>, StoreError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .values_mut()
            .find(|r| r.federated_speaker_id == federated_speaker_id);
        Ok(row.map(|r| {
            r.consent_scopes.clear();
            r.deletion_deadline = deletion_deadline;
            r.updated_at = Utc::now();
            r.clone()
        }))
    }

    async fn update_consent_scopes(
        &self,
        federated_speaker_id: Uuid,
        scopes: &[String],
    ) -> Result<Option<FederatedSpeaker>, StoreError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .values_mut()
            .find(|r| r.federated_speaker_id == federated_speaker_id);
        Ok(row.map(|r| {
            r.consent_scopes = scopes.to_vec();
            r.deletion_deadline = None;
            r.updated_at = Utc::now();
            r.clone()
        }))
    }

    async fn delete_past_deadline(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, r| !matches!(r.deletion_deadline, Some(d) if d <= now));
        Ok((before - rows.len()) as u64)
    }
}

/// In-memory [`MessageStore`].
#[derive(Clone, Default)]
pub struct MemoryMessageStore {
    rows: Arc<RwLock<HashMap<Uuid, FederatedMessage>>>,
}

impl MemoryMessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn create(&self, new: NewFederatedMessage) -> Result<FederatedMessage, StoreError> {
        let mut rows = self.rows.write().await;
        if let Some(external) = new.external_message_id {
            if rows
                .values()
                .any(|m| m.external_message_id == Some(external))
            {
                return Err(StoreError::Conflict(format!(
                    "message with external id {external} already exists"
                )));
            }
        }
        let row = FederatedMessage {
            id: Uuid::new_v4(),
            event_id: new.event_id,
            submission_id: new.submission_id,
            external_message_id: new.external_message_id,
            direction: new.direction,
            body: new.body,
            sent_at: Utc::now(),
            read_at: None,
        };
        rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_by_external_id(
        &self,
        external_message_id: Uuid,
    ) -> Result<Option<FederatedMessage>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|m| m.external_message_id == Some(external_message_id))
            .cloned())
    }

    async fn mark_read_by_external_id(
        &self,
        external_message_id: Uuid,
    ) -> Result<Option<FederatedMessage>, StoreError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .values_mut()
            .find(|m| m.external_message_id == Some(external_message_id));
        Ok(row.map(|m| {
            if m.read_at.is_none() {
                m.read_at = Some(Utc::now());
            }
            m.clone()
        }))
    }
}

/// In-memory [`EventFederationStore`].
#[derive(Clone, Default)]
pub struct MemoryEventFederationStore {
    rows: Arc<RwLock<HashMap<Uuid, EventFederation>>>,
}

impl MemoryEventFederationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventFederationStore for MemoryEventFederationStore {
    async fn create(
        &self,
        event_id: Uuid,
        federated_event_id: Uuid,
        webhook_url: &str,
        webhook_secret_encrypted: &str,
    ) -> Result<EventFederation, StoreError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&event_id)
            || rows
                .values()
                .any(|r| r.federated_event_id == federated_event_id)
        {
            return Err(StoreError::Conflict(format!(
                "event {event_id} already registered"
            )));
        }
        let row = EventFederation {
            event_id,
            federated_event_id,
            webhook_url: webhook_url.to_string(),
            webhook_secret_encrypted: webhook_secret_encrypted.to_string(),
            registered_at: Utc::now(),
        };
        rows.insert(event_id, row.clone());
        Ok(row)
    }

    async fn find_by_event(&self, event_id: Uuid) -> Result<Option<EventFederation>, StoreError> {
        Ok(self.rows.read().await.get(&event_id).cloned())
    }

    async fn find_by_federated_event(
        &self,
        federated_event_id: Uuid,
    ) -> Result<Option<EventFederation>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|r| r.federated_event_id == federated_event_id)
            .cloned())
    }

    async fn delete(&self, event_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.rows.write().await.remove(&event_id).is_some())
    }
}

/// In-memory [`WebhookQueueStore`].
///
/// Equivalent queue semantics to the Postgres store, but entries are lost
/// on process restart. Services log a warning when constructed with this
/// store outside tests.
#[derive(Clone, Default)]
pub struct MemoryWebhookQueueStore {
    rows: Arc<RwLock<HashMap<Uuid, WebhookQueueEntry>>>,
}

impl MemoryWebhookQueueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookQueueStore for MemoryWebhookQueueStore {
    async fn enqueue(&self, new: NewWebhookQueueEntry) -> Result<WebhookQueueEntry, StoreError> {
        let now = Utc::now();
        let entry = WebhookQueueEntry {
            id: Uuid::new_v4(),
            event_id: new.event_id,
            event_type: new.event_type,
            payload: new.payload,
            webhook_url: new.webhook_url,
            attempt: 1,
            last_error: new.last_error,
            last_attempt_at: Some(now),
            next_retry_at: new.next_retry_at,
            status: QueueStatus::PendingRetry.as_str().to_string(),
            created_at: now,
        };
        self.rows.write().await.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn find(&self, id: Uuid) -> Result<Option<WebhookQueueEntry>, StoreError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn due_for_retry(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<WebhookQueueEntry>, StoreError> {
        let rows = self.rows.read().await;
        let mut due: Vec<_> = rows
            .values()
            .filter(|e| {
                e.queue_status() == QueueStatus::PendingRetry
                    && matches!(e.next_retry_at, Some(t) if t <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|e| e.next_retry_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn mark_retry_failed(
        &self,
        id: Uuid,
        attempt: i32,
        last_error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<Option<WebhookQueueEntry>, StoreError> {
        let mut rows = self.rows.write().await;
        Ok(rows.get_mut(&id).map(|e| {
            e.attempt = attempt;
            e.last_error = Some(last_error.to_string());
            e.last_attempt_at = Some(Utc::now());
            e.next_retry_at = Some(next_retry_at);
            e.status = QueueStatus::PendingRetry.as_str().to_string();
            e.clone()
        }))
    }

    async fn mark_dead_letter(
        &self,
        id: Uuid,
        attempt: i32,
        last_error: &str,
    ) -> Result<Option<WebhookQueueEntry>, StoreError> {
        let mut rows = self.rows.write().await;
        Ok(rows.get_mut(&id).map(|e| {
            e.attempt = attempt;
            e.last_error = Some(last_error.to_string());
            e.last_attempt_at = Some(Utc::now());
            e.next_retry_at = None;
            e.status = QueueStatus::DeadLetter.as_str().to_string();
            e.clone()
        }))
    }

    async fn mark_success(
        &self,
        id: Uuid,
        attempt: i32,
    ) -> Result<Option<WebhookQueueEntry>, StoreError> {
        let mut rows = self.rows.write().await;
        Ok(rows.get_mut(&id).map(|e| {
            e.attempt = attempt;
            e.last_error = None;
            e.last_attempt_at = Some(Utc::now());
            e.next_retry_at = None;
            e.status = QueueStatus::Success.as_str().to_string();
            e.clone()
        }))
    }

    async fn reset_for_retry(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<WebhookQueueEntry>, StoreError> {
        let mut rows = self.rows.write().await;
        let entry = rows
            .get_mut(&id)
            .filter(|e| e.queue_status() == QueueStatus::DeadLetter);
        Ok(entry.map(|e| {
            e.attempt = 0;
            e.last_error = None;
            e.next_retry_at = Some(now);
            e.status = QueueStatus::PendingRetry.as_str().to_string();
            e.clone()
        }))
    }

    async fn list_dead_letters(&self, limit: i64) -> Result<Vec<WebhookQueueEntry>, StoreError> {
        let rows = self.rows.read().await;
        let mut out: Vec<_> = rows
            .values()
            .filter(|e| e.queue_status() == QueueStatus::DeadLetter)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.rows.write().await.remove(&id).is_some())
    }

    async fn cleanup(
        &self,
        success_before: DateTime<Utc>,
        dead_letter_before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, e| match e.queue_status() {
            QueueStatus::Success => e.created_at >= success_before,
            QueueStatus::DeadLetter => e.created_at >= dead_letter_before,
            QueueStatus::PendingRetry => true,
        });
        Ok((before - rows.len()) as u64)
    }

    async fn stats(&self) -> Result<QueueStats, StoreError> {
        let rows = self.rows.read().await;
        let mut stats = QueueStats::default();
        for e in rows.values() {
            match e.queue_status() {
                QueueStatus::PendingRetry => {
                    stats.pending_retry += 1;
                    stats.oldest_pending = match (stats.oldest_pending, e.next_retry_at) {
                        (Some(a), Some(b)) => Some(a.min(b)),
                        (a, b) => a.or(b),
                    };
                }
                QueueStatus::DeadLetter => stats.dead_letter += 1,
                QueueStatus::Success => stats.success += 1,
            }
        }
        Ok(stats)
    }

    fn is_durable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_entry(url: &str) -> NewWebhookQueueEntry {
        NewWebhookQueueEntry {
            event_id: Uuid::new_v4(),
            event_type: "submission.created".to_string(),
            payload: serde_json::json!({"id": "x"}),
            webhook_url: url.to_string(),
            last_error: Some("HTTP 503".to_string()),
            next_retry_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn test_enqueue_sets_first_attempt() {
        let store = MemoryWebhookQueueStore::new();
        let entry = store.enqueue(new_entry("https://dir.example/hook")).await.unwrap();
        assert_eq!(entry.attempt, 1);
        assert_eq!(entry.queue_status(), QueueStatus::PendingRetry);
        assert!(entry.next_retry_at.is_some());
    }

    #[tokio::test]
    async fn test_due_for_retry_oldest_first() {
        let store = MemoryWebhookQueueStore::new();
        let now = Utc::now();

        let a = store.enqueue(new_entry("https://dir.example/a")).await.unwrap();
        let b = store.enqueue(new_entry("https://dir.example/b")).await.unwrap();

        // a due later than b
        store
            .mark_retry_failed(a.id, 2, "HTTP 503", now - Duration::seconds(5))
            .await
            .unwrap();
        store
            .mark_retry_failed(b.id, 2, "HTTP 503", now - Duration::seconds(30))
            .await
            .unwrap();

        let due = store.due_for_retry(now, 10).await.unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].id, b.id);
        assert_eq!(due[1].id, a.id);
    }

    #[tokio::test]
    async fn test_due_for_retry_excludes_future_and_terminal() {
        let store = MemoryWebhookQueueStore::new();
        let now = Utc::now();

        let future = store.enqueue(new_entry("https://dir.example/f")).await.unwrap();
        store
            .mark_retry_failed(future.id, 2, "HTTP 503", now + Duration::hours(1))
            .await
            .unwrap();

        let dead = store.enqueue(new_entry("https://dir.example/d")).await.unwrap();
        store.mark_dead_letter(dead.id, 5, "HTTP 500").await.unwrap();

        assert!(store.due_for_retry(now, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dead_letter_clears_next_retry() {
        let store = MemoryWebhookQueueStore::new();
        let entry = store.enqueue(new_entry("https://dir.example/hook")).await.unwrap();
        let dead = store
            .mark_dead_letter(entry.id, 5, "HTTP 500")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dead.queue_status(), QueueStatus::DeadLetter);
        assert!(dead.next_retry_at.is_none());
        assert_eq!(dead.attempt, 5);
    }

    #[tokio::test]
    async fn test_reset_for_retry_only_from_dead_letter() {
        let store = MemoryWebhookQueueStore::new();
        let entry = store.enqueue(new_entry("https://dir.example/hook")).await.unwrap();

        // Pending entries cannot be manually replayed.
        assert!(store
            .reset_for_retry(entry.id, Utc::now())
            .await
            .unwrap()
            .is_none());

        store.mark_dead_letter(entry.id, 5, "HTTP 500").await.unwrap();
        let reset = store
            .reset_for_retry(entry.id, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reset.attempt, 0);
        assert_eq!(reset.queue_status(), QueueStatus::PendingRetry);
        assert!(reset.next_retry_at.is_some());
    }

    #[tokio::test]
    async fn test_cleanup_windows() {
        let store = MemoryWebhookQueueStore::new();
        let ok = store.enqueue(new_entry("https://dir.example/ok")).await.unwrap();
        store.mark_success(ok.id, 2).await.unwrap();
        let dead = store.enqueue(new_entry("https://dir.example/dead")).await.unwrap();
        store.mark_dead_letter(dead.id, 5, "HTTP 500").await.unwrap();

        // Entries were just created; cutoffs in the past remove nothing.
        let removed = store
            .cleanup(Utc::now() - Duration::hours(24), Utc::now() - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(removed, 0);

        // Cutoffs in the future purge both terminal entries.
        let removed = store
            .cleanup(Utc::now() + Duration::hours(1), Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(!store.is_durable());
    }

    #[tokio::test]
    async fn test_stats_counts_by_status() {
        let store = MemoryWebhookQueueStore::new();
        store.enqueue(new_entry("https://dir.example/a")).await.unwrap();
        let dead = store.enqueue(new_entry("https://dir.example/b")).await.unwrap();
        store.mark_dead_letter(dead.id, 5, "HTTP 500").await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.pending_retry, 1);
        assert_eq!(stats.dead_letter, 1);
        assert_eq!(stats.success, 0);
        assert!(stats.oldest_pending.is_some());
    }

    #[tokio::test]
    async fn test_speaker_store_unique_federated_id() {
        let store = MemorySpeakerStore::new();
        let fid = Uuid::new_v4();
        store
            .create(NewFederatedSpeaker::placeholder(fid, None))
            .await
            .unwrap();
        let err = store
            .create(NewFederatedSpeaker::placeholder(fid, None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_revoke_consent_clears_scopes_keeps_row() {
        let store = MemorySpeakerStore::new();
        let fid = Uuid::new_v4();
        let mut new = NewFederatedSpeaker::placeholder(fid, None);
        new.consent_scopes = vec!["profile".to_string(), "materials".to_string()];
        store.create(new).await.unwrap();

        let deadline = Utc::now() + Duration::days(30);
        let revoked = store
            .revoke_consent(fid, Some(deadline))
            .await
            .unwrap()
            .unwrap();
        assert!(revoked.consent_scopes.is_empty());
        assert_eq!(revoked.deletion_deadline, Some(deadline));

        // Row still present until the sweep runs.
        assert!(store.find_by_federated_id(fid).await.unwrap().is_some());
        let removed = store
            .delete_past_deadline(deadline + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.find_by_federated_id(fid).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_message_store_external_id_unique() {
        let store = MemoryMessageStore::new();
        let external = Uuid::new_v4();
        let new = NewFederatedMessage {
            event_id: Uuid::new_v4(),
            submission_id: None,
            external_message_id: Some(external),
            direction: "speaker".to_string(),
            body: "hello".to_string(),
        };
        store.create(new.clone()).await.unwrap();
        assert!(matches!(
            store.create(new).await.unwrap_err(),
            StoreError::Conflict(_)
        ));
        assert!(store.find_by_external_id(external).await.unwrap().is_some());
    }
}
