//! Consent-driven speaker sync against a mock directory.

use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lectern_core::FederationConfig;
use lectern_db::{MemorySpeakerStore, SpeakerStore};
use lectern_federation::{
    ConsentClient, FederatedSpeakerRepository, FieldEncryptor, SpeakerSyncService, SyncOptions,
};

struct Harness {
    sync: SpeakerSyncService,
    speakers: Arc<MemorySpeakerStore>,
    _uploads: tempfile::TempDir,
}

fn harness(server: &MockServer, encryptor: Option<FieldEncryptor>) -> Harness {
    let uploads = tempfile::tempdir().unwrap();
    let mut config = FederationConfig::for_tests(server.uri());
    config.upload_root = uploads.path().to_path_buf();

    let speakers: Arc<MemorySpeakerStore> = Arc::new(MemorySpeakerStore::new());
    let consent = ConsentClient::new(&config).unwrap();
    let repo = FederatedSpeakerRepository::new(speakers.clone(), encryptor);
    Harness {
        sync: SpeakerSyncService::new(consent, repo, &config),
        speakers,
        _uploads: uploads,
    }
}

fn options(speaker_id: Uuid) -> SyncOptions {
    SyncOptions {
        consent_token: "tok-1".to_string(),
        speaker_id,
        federated_event_id: Uuid::new_v4(),
        event_id: None,
        download_materials: true,
    }
}

async fn mount_profile(server: &MockServer, speaker_id: Uuid, profile: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/speakers/{speaker_id}/profile")))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile))
        .mount(server)
        .await;
}

#[tokio::test]
async fn sync_downloads_signed_materials() {
    let server = MockServer::start().await;
    let speaker_id = Uuid::new_v4();
    mount_profile(
        &server,
        speaker_id,
        serde_json::json!({
            "speaker": {
                "id": speaker_id,
                "name": "Ada",
                "scopes": ["profile", "materials"],
                "materials": [
                    {"name": "slides.pdf", "url": format!("{}/files/slides.pdf?sig=abc", server.uri())},
                    {"name": "notes.pdf", "url": "https://files.example.com/notes.pdf"},
                ],
            }
        }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/files/slides.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, None);
    let outcome = h.sync.sync_federated_speaker(&options(speaker_id)).await.unwrap();

    // Signed URL downloaded, stable URL referenced; both stored.
    assert_eq!(outcome.materials_synced, 2);
    assert_eq!(outcome.materials_skipped, 0);
    let materials = outcome.speaker.materials.as_array().unwrap();
    assert_eq!(materials.len(), 2);
    assert_eq!(materials[0]["source"], "downloaded");
    assert!(std::path::Path::new(materials[0]["path"].as_str().unwrap()).exists());
    assert_eq!(materials[1]["source"], "external");
}

#[tokio::test]
async fn sync_skips_materials_without_consent_scope() {
    let server = MockServer::start().await;
    let speaker_id = Uuid::new_v4();
    mount_profile(
        &server,
        speaker_id,
        serde_json::json!({
            "speaker": {
                "id": speaker_id,
                "name": "Ada",
                "scopes": ["profile"],
                "materials": [
                    {"name": "slides.pdf", "url": format!("{}/files/slides.pdf?sig=abc", server.uri())},
                ],
            }
        }),
    )
    .await;

    let h = harness(&server, None);
    let outcome = h.sync.sync_federated_speaker(&options(speaker_id)).await.unwrap();

    assert_eq!(outcome.materials_synced, 0);
    // Only the profile fetch hit the server; no file request.
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn sync_links_co_speakers_and_records_guests() {
    let server = MockServer::start().await;
    let speaker_id = Uuid::new_v4();
    let co_speaker_id = Uuid::new_v4();
    mount_profile(
        &server,
        speaker_id,
        serde_json::json!({
            "speaker": {
                "id": speaker_id,
                "name": "Ada",
                "scopes": ["profile"],
                "coSpeakers": [
                    {"speakerId": co_speaker_id, "name": "Grace"},
                    {"name": "Guest Speaker", "email": "guest@example.com"},
                ],
            }
        }),
    )
    .await;

    let h = harness(&server, None);
    let outcome = h.sync.sync_federated_speaker(&options(speaker_id)).await.unwrap();

    assert_eq!(outcome.co_speakers_linked, 1);
    let placeholder = h
        .speakers
        .find_by_federated_id(co_speaker_id)
        .await
        .unwrap()
        .unwrap();
    assert!(placeholder.consent_scopes.is_empty());

    let guests = outcome.speaker.guest_co_speakers.as_array().unwrap();
    assert_eq!(guests.len(), 1);
    assert_eq!(guests[0]["name"], "Guest Speaker");
}

#[tokio::test]
async fn sync_encrypts_pii_at_rest() {
    let server = MockServer::start().await;
    let speaker_id = Uuid::new_v4();
    mount_profile(
        &server,
        speaker_id,
        serde_json::json!({
            "speaker": {
                "id": speaker_id,
                "name": "Ada Lovelace",
                "email": "ada@example.com",
                "scopes": ["profile"],
            }
        }),
    )
    .await;

    let h = harness(&server, Some(FieldEncryptor::new([7u8; 32])));
    let outcome = h.sync.sync_federated_speaker(&options(speaker_id)).await.unwrap();

    // The service sees plaintext; the store holds ciphertext.
    assert_eq!(outcome.speaker.name.as_deref(), Some("Ada Lovelace"));
    let raw = h
        .speakers
        .find_by_federated_id(speaker_id)
        .await
        .unwrap()
        .unwrap();
    assert!(raw.name.unwrap().starts_with("enc:v1:"));
    assert!(raw.email.unwrap().starts_with("enc:v1:"));
}
