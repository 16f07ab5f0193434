//! Federated speaker repository with transparent PII encryption.
//!
//! Wraps a [`SpeakerStore`] so callers only ever see plaintext: PII fields
//! are encrypted before write and decrypted after read when an encryptor
//! is configured. The upsert is idempotent on the directory speaker id and
//! merges incoming values over existing ones without clobbering populated
//! fields with empty data.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use lectern_db::models::{FederatedSpeaker, NewFederatedSpeaker};
use lectern_db::SpeakerStore;

use crate::encryption::FieldEncryptor;
use crate::error::{FederationError, FederationResult};

/// Tally from a bulk encryption/decryption migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub processed: u64,
    pub succeeded: u64,
    pub errors: u64,
}

/// Repository over federated speaker rows.
#[derive(Clone)]
pub struct FederatedSpeakerRepository {
    store: Arc<dyn SpeakerStore>,
    encryptor: Option<FieldEncryptor>,
}

impl FederatedSpeakerRepository {
    /// Build a repository. Passing `None` for the encryptor stores PII in
    /// plaintext (development only).
    pub fn new(store: Arc<dyn SpeakerStore>, encryptor: Option<FieldEncryptor>) -> Self {
        if encryptor.is_none() {
            tracing::warn!(
                target: "lectern::federation",
                "speaker PII encryption is disabled"
            );
        }
        Self { store, encryptor }
    }

    /// Idempotent upsert keyed by the directory speaker id.
    ///
    /// Creates the row on first sync. On re-sync, incoming populated
    /// fields overwrite stored ones; incoming empty fields leave the
    /// stored values untouched.
    pub async fn upsert(&self, incoming: NewFederatedSpeaker) -> FederationResult<FederatedSpeaker> {
        match self
            .store
            .find_by_federated_id(incoming.federated_speaker_id)
            .await?
        {
            Some(existing) => {
                let mut merged = self.decrypt_row(existing)?;
                merge_field(&mut merged.name, incoming.name);
                merge_field(&mut merged.email, incoming.email);
                merge_field(&mut merged.bio, incoming.bio);
                merge_field(&mut merged.location, incoming.location);
                merge_field(&mut merged.company, incoming.company);
                merge_field(&mut merged.position, incoming.position);
                merge_field(&mut merged.social_links, incoming.social_links);
                merge_field(&mut merged.experience, incoming.experience);
                if !incoming.consent_scopes.is_empty() {
                    merged.consent_scopes = incoming.consent_scopes;
                }
                if incoming.event_id.is_some() {
                    merged.event_id = incoming.event_id;
                }
                if !json_is_empty(&incoming.materials) {
                    merged.materials = incoming.materials;
                }
                if !json_is_empty(&incoming.guest_co_speakers) {
                    merged.guest_co_speakers = incoming.guest_co_speakers;
                }

                let encrypted = self.encrypt_row(merged)?;
                let updated = self.store.update(encrypted).await?;
                self.decrypt_row(updated)
            }
            None => {
                let encrypted = self.encrypt_new(incoming)?;
                let created = self.store.create(encrypted).await?;
                self.decrypt_row(created)
            }
        }
    }

    /// Rewrite an existing row (plaintext in, plaintext out).
    pub async fn update(&self, row: FederatedSpeaker) -> FederationResult<FederatedSpeaker> {
        let encrypted = self.encrypt_row(row)?;
        let updated = self.store.update(encrypted).await?;
        self.decrypt_row(updated)
    }

    /// Create a placeholder row for a linked co-speaker, if absent.
    ///
    /// Placeholders have empty consent scopes and carry no PII until the
    /// co-speaker completes their own consent flow.
    pub async fn ensure_placeholder(
        &self,
        federated_speaker_id: Uuid,
        event_id: Option<Uuid>,
    ) -> FederationResult<FederatedSpeaker> {
        if let Some(existing) = self.store.find_by_federated_id(federated_speaker_id).await? {
            return self.decrypt_row(existing);
        }
        let created = self
            .store
            .create(NewFederatedSpeaker::placeholder(federated_speaker_id, event_id))
            .await?;
        self.decrypt_row(created)
    }

    /// Look up by directory speaker id, decrypted.
    pub async fn get(
        &self,
        federated_speaker_id: Uuid,
    ) -> FederationResult<Option<FederatedSpeaker>> {
        match self.store.find_by_federated_id(federated_speaker_id).await? {
            Some(row) => Ok(Some(self.decrypt_row(row)?)),
            None => Ok(None),
        }
    }

    /// Look up by local row id, decrypted.
    pub async fn get_by_id(&self, id: Uuid) -> FederationResult<Option<FederatedSpeaker>> {
        match self.store.find_by_id(id).await? {
            Some(row) => Ok(Some(self.decrypt_row(row)?)),
            None => Ok(None),
        }
    }

    /// All speakers synced for an event, decrypted.
    pub async fn list_for_event(&self, event_id: Uuid) -> FederationResult<Vec<FederatedSpeaker>> {
        self.store
            .list_for_event(event_id)
            .await?
            .into_iter()
            .map(|row| self.decrypt_row(row))
            .collect()
    }

    /// Replace consent scopes for a speaker.
    pub async fn update_consent_scopes(
        &self,
        federated_speaker_id: Uuid,
        scopes: &[String],
    ) -> FederationResult<Option<FederatedSpeaker>> {
        match self
            .store
            .update_consent_scopes(federated_speaker_id, scopes)
            .await?
        {
            Some(row) => Ok(Some(self.decrypt_row(row)?)),
            None => Ok(None),
        }
    }

    /// Clear consent scopes and stamp the deletion deadline.
    ///
    /// The row itself is removed later by the deadline sweep, not here.
    pub async fn revoke_consent(
        &self,
        federated_speaker_id: Uuid,
        deletion_deadline: Option<DateTime<Utc>>,
    ) -> FederationResult<Option<FederatedSpeaker>> {
        match self
            .store
            .revoke_consent(federated_speaker_id, deletion_deadline)
            .await?
        {
            Some(row) => Ok(Some(self.decrypt_row(row)?)),
            None => Ok(None),
        }
    }

    /// Delete rows whose deletion deadline has passed.
    pub async fn delete_past_deadline(&self, now: DateTime<Utc>) -> FederationResult<u64> {
        Ok(self.store.delete_past_deadline(now).await?)
    }

    /// Encrypt all existing rows in place.
    ///
    /// Already-encrypted fields are skipped via the version marker.
    /// Continues past per-row failures, tallying them in the report.
    pub async fn migrate_encrypt_all(&self) -> FederationResult<MigrationReport> {
        let Some(encryptor) = self.encryptor.clone() else {
            return Err(FederationError::EncryptionFailed(
                "no encryption key configured".to_string(),
            ));
        };
        self.migrate_with(|value| encryptor.encrypt(value)).await
    }

    /// Decrypt all existing rows in place (for key rotation or disabling
    /// encryption). Plaintext fields pass through unchanged.
    pub async fn migrate_decrypt_all(&self) -> FederationResult<MigrationReport> {
        let Some(encryptor) = self.encryptor.clone() else {
            return Err(FederationError::DecryptionFailed(
                "no encryption key configured".to_string(),
            ));
        };
        self.migrate_with(|value| encryptor.decrypt(value)).await
    }

    async fn migrate_with<F>(&self, transform: F) -> FederationResult<MigrationReport>
    where
        F: Fn(&str) -> FederationResult<String>,
    {
        let mut report = MigrationReport::default();
        for row in self.store.list_all().await? {
            report.processed += 1;
            let id = row.id;
            match transform_row(row, &transform) {
                Ok(transformed) => match self.store.update(transformed).await {
                    Ok(_) => report.succeeded += 1,
                    Err(e) => {
                        report.errors += 1;
                        tracing::error!(
                            target: "lectern::federation",
                            speaker_id = %id,
                            error = %e,
                            "migration write failed"
                        );
                    }
                },
                Err(e) => {
                    report.errors += 1;
                    tracing::error!(
                        target: "lectern::federation",
                        speaker_id = %id,
                        error = %e,
                        "migration transform failed"
                    );
                }
            }
        }
        Ok(report)
    }

    fn encrypt_new(&self, mut new: NewFederatedSpeaker) -> FederationResult<NewFederatedSpeaker> {
        if let Some(enc) = &self.encryptor {
            new.name = transform_opt(new.name, |v| enc.encrypt(v))?;
            new.email = transform_opt(new.email, |v| enc.encrypt(v))?;
            new.bio = transform_opt(new.bio, |v| enc.encrypt(v))?;
            new.location = transform_opt(new.location, |v| enc.encrypt(v))?;
            new.company = transform_opt(new.company, |v| enc.encrypt(v))?;
            new.position = transform_opt(new.position, |v| enc.encrypt(v))?;
            new.social_links = transform_opt(new.social_links, |v| enc.encrypt(v))?;
            new.experience = transform_opt(new.experience, |v| enc.encrypt(v))?;
        }
        Ok(new)
    }

    fn encrypt_row(&self, row: FederatedSpeaker) -> FederationResult<FederatedSpeaker> {
        match &self.encryptor {
            Some(enc) => transform_row(row, |v| enc.encrypt(v)),
            None => Ok(row),
        }
    }

    fn decrypt_row(&self, row: FederatedSpeaker) -> FederationResult<FederatedSpeaker> {
        match &self.encryptor {
            Some(enc) => transform_row(row, |v| enc.decrypt(v)),
            None => Ok(row),
        }
    }
}

fn transform_row<F>(mut row: FederatedSpeaker, transform: F) -> FederationResult<FederatedSpeaker>
where
    F: Fn(&str) -> FederationResult<String>,
{
    row.name = transform_opt(row.name, &transform)?;
    row.email = transform_opt(row.email, &transform)?;
    row.bio = transform_opt(row.bio, &transform)?;
    row.location = transform_opt(row.location, &transform)?;
    row.company = transform_opt(row.company, &transform)?;
    row.position = transform_opt(row.position, &transform)?;
    row.social_links = transform_opt(row.social_links, &transform)?;
    row.experience = transform_opt(row.experience, &transform)?;
    Ok(row)
}

fn transform_opt<F>(value: Option<String>, transform: F) -> FederationResult<Option<String>>
where
    F: Fn(&str) -> FederationResult<String>,
{
    match value {
        Some(v) => Ok(Some(transform(&v)?)),
        None => Ok(None),
    }
}

fn merge_field(existing: &mut Option<String>, incoming: Option<String>) {
    if let Some(value) = incoming {
        if !value.trim().is_empty() {
            *existing = Some(value);
        }
    }
}

fn json_is_empty(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Array(a) => a.is_empty(),
        serde_json::Value::Object(o) => o.is_empty(),
        _ => false,
    }
}
