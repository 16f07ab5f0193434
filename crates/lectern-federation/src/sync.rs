//! Speaker profile synchronization.
//!
//! Orchestrates a consent-driven sync: profile fetch, merge-upsert into
//! the repository, consent-gated material sync, and co-speaker
//! processing. Overall success depends only on the profile upsert;
//! per-material and per-co-speaker failures are logged and skipped.

use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use lectern_core::FederationConfig;
use lectern_db::models::{FederatedSpeaker, NewFederatedSpeaker};

use crate::consent::{ConsentClient, SpeakerProfile};
use crate::error::FederationResult;
use crate::speakers::FederatedSpeakerRepository;
use crate::validation::{is_signed_url, sanitize_file_name};

/// Consent scope gating material sync.
pub const SCOPE_MATERIALS: &str = "materials";

/// Parameters for a speaker sync.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub consent_token: String,
    /// Directory speaker id.
    pub speaker_id: Uuid,
    /// Directory event id; namespaces downloaded materials.
    pub federated_event_id: Uuid,
    /// Local event to attach the profile to, if known.
    pub event_id: Option<Uuid>,
    /// Whether to sync materials (still gated by the materials scope).
    pub download_materials: bool,
}

/// A synced material reference stored on the speaker row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "source")]
pub enum SyncedMaterial {
    /// Signed URL downloaded and rehosted under the upload root.
    #[serde(rename = "downloaded")]
    Downloaded { name: String, path: String },
    /// Stable external URL referenced directly.
    #[serde(rename = "external")]
    External { name: String, url: String },
}

/// Result of a completed sync.
#[derive(Debug)]
pub struct SyncOutcome {
    pub speaker: FederatedSpeaker,
    pub materials_synced: usize,
    pub materials_skipped: usize,
    pub co_speakers_linked: usize,
}

/// Orchestrates consent-token based speaker synchronization.
#[derive(Clone)]
pub struct SpeakerSyncService {
    consent: ConsentClient,
    repo: FederatedSpeakerRepository,
    upload_root: PathBuf,
}

impl SpeakerSyncService {
    pub fn new(
        consent: ConsentClient,
        repo: FederatedSpeakerRepository,
        config: &FederationConfig,
    ) -> Self {
        Self {
            consent,
            repo,
            upload_root: config.upload_root.clone(),
        }
    }

    /// Sync a speaker profile under a consent token.
    ///
    /// Aborts with a typed error if the profile fetch fails; everything
    /// after the core upsert is best-effort.
    pub async fn sync_federated_speaker(
        &self,
        options: &SyncOptions,
    ) -> FederationResult<SyncOutcome> {
        let profile = self
            .consent
            .fetch_speaker_profile(&options.consent_token, options.speaker_id)
            .await?;

        let mut speaker = self
            .repo
            .upsert(new_record_from_profile(&profile, options.event_id))
            .await?;

        tracing::info!(
            target: "lectern::federation",
            federated_speaker_id = %profile.federated_speaker_id,
            scopes = ?profile.consent_scopes,
            "speaker profile synced"
        );

        let mut materials_synced = 0;
        let mut materials_skipped = 0;
        let consented_to_materials = profile
            .consent_scopes
            .iter()
            .any(|s| s == SCOPE_MATERIALS);

        if options.download_materials && consented_to_materials && !profile.materials.is_empty() {
            let (synced, skipped) = self.sync_materials(&profile, options).await;
            materials_synced = synced.len();
            materials_skipped = skipped;
            if !synced.is_empty() {
                speaker.materials = serde_json::to_value(&synced)
                    .unwrap_or_else(|_| serde_json::Value::Array(Vec::new()));
                match self.repo.update(speaker.clone()).await {
                    Ok(updated) => speaker = updated,
                    Err(e) => {
                        tracing::warn!(
                            target: "lectern::federation",
                            error = %e,
                            "failed to store material references"
                        );
                    }
                }
            }
        }

        let (co_speakers_linked, guests) = self.process_co_speakers(&profile, options).await;
        if !guests.is_empty() {
            speaker.guest_co_speakers = serde_json::Value::Array(guests);
            match self.repo.update(speaker.clone()).await {
                Ok(updated) => speaker = updated,
                Err(e) => {
                    tracing::warn!(
                        target: "lectern::federation",
                        error = %e,
                        "failed to store guest co-speakers"
                    );
                }
            }
        }

        Ok(SyncOutcome {
            speaker,
            materials_synced,
            materials_skipped,
            co_speakers_linked,
        })
    }

    /// Sync each material, downloading signed URLs and referencing stable
    /// ones. Returns the stored references and the skip count.
    async fn sync_materials(
        &self,
        profile: &SpeakerProfile,
        options: &SyncOptions,
    ) -> (Vec<SyncedMaterial>, usize) {
        let mut synced = Vec::new();
        let mut skipped = 0;

        for material in &profile.materials {
            let file_name = sanitize_file_name(&material.name);

            if is_signed_url(&material.url) {
                let dest = self
                    .upload_root
                    .join(sanitize_file_name(&options.federated_event_id.to_string()))
                    .join(sanitize_file_name(&profile.federated_speaker_id.to_string()))
                    .join(&file_name);

                match self.consent.download_material(&material.url, &dest).await {
                    Ok(_) => synced.push(SyncedMaterial::Downloaded {
                        name: file_name,
                        path: dest.to_string_lossy().into_owned(),
                    }),
                    Err(e) => {
                        skipped += 1;
                        tracing::warn!(
                            target: "lectern::federation",
                            name = %material.name,
                            error = %e,
                            "material download failed, skipping"
                        );
                    }
                }
            } else {
                synced.push(SyncedMaterial::External {
                    name: file_name,
                    url: material.url.clone(),
                });
            }
        }

        (synced, skipped)
    }

    /// Process co-speakers: linked ones get a placeholder row, guests are
    /// returned as metadata values.
    async fn process_co_speakers(
        &self,
        profile: &SpeakerProfile,
        options: &SyncOptions,
    ) -> (usize, Vec<serde_json::Value>) {
        let mut linked = 0;
        let mut guests = Vec::new();

        for co_speaker in &profile.co_speakers {
            match co_speaker.federated_speaker_id {
                Some(remote_id) => {
                    match self.repo.ensure_placeholder(remote_id, options.event_id).await {
                        Ok(_) => linked += 1,
                        Err(e) => {
                            tracing::warn!(
                                target: "lectern::federation",
                                co_speaker_id = %remote_id,
                                error = %e,
                                "co-speaker placeholder failed, skipping"
                            );
                        }
                    }
                }
                None => {
                    guests.push(serde_json::json!({
                        "name": co_speaker.name,
                        "email": co_speaker.email,
                    }));
                }
            }
        }

        (linked, guests)
    }
}

/// Build a repository record from a normalized profile.
fn new_record_from_profile(
    profile: &SpeakerProfile,
    event_id: Option<Uuid>,
) -> NewFederatedSpeaker {
    NewFederatedSpeaker {
        federated_speaker_id: profile.federated_speaker_id,
        event_id,
        name: profile.name.clone(),
        email: profile.email.clone(),
        bio: profile.bio.clone(),
        location: profile.location.clone(),
        company: profile.company.clone(),
        position: profile.position.clone(),
        // The link map is serialized and treated as one PII string.
        social_links: profile
            .social_links
            .as_ref()
            .and_then(|v| serde_json::to_string(v).ok()),
        experience: profile.experience.clone(),
        consent_scopes: profile.consent_scopes.clone(),
        materials: serde_json::Value::Array(Vec::new()),
        guest_co_speakers: serde_json::Value::Array(Vec::new()),
    }
}
