//! License and consent clients against a mock directory API.

use uuid::Uuid;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lectern_core::FederationConfig;
use lectern_federation::license::{HeartbeatStats, APP_URL_HEADER, LICENSE_KEY_HEADER};
use lectern_federation::{ConsentClient, ConsentError, ConsentFailure, FederationError, LicenseClient};

fn config(server: &MockServer) -> FederationConfig {
    FederationConfig::for_tests(server.uri())
}

// --- License client ---

#[tokio::test]
async fn validate_license_sends_identity_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/license/validate"))
        .and(header(LICENSE_KEY_HEADER, "lk_test_0000"))
        .and(header(APP_URL_HEADER, "http://localhost:3000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "valid": true,
            "license": {
                "tier": "pro",
                "status": "active",
                "organizationName": "RustConf",
                "features": {"federation": true},
                "limits": {"events": 10},
            },
            "warnings": ["License expires in 14 days"],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = LicenseClient::new(&config(&server)).unwrap();
    let outcome = client.validate_license().await.unwrap();

    assert!(outcome.valid);
    let license = outcome.license.unwrap();
    assert_eq!(license.tier, "pro");
    assert_eq!(license.features.get("federation"), Some(&true));
    assert_eq!(outcome.warnings, vec!["License expires in 14 days"]);
}

#[tokio::test]
async fn validate_license_parses_expected_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/license/validate"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "valid": false,
            "error": "license_suspended",
        })))
        .mount(&server)
        .await;

    let client = LicenseClient::new(&config(&server)).unwrap();
    let outcome = client.validate_license().await.unwrap();
    assert!(!outcome.valid);
    assert_eq!(outcome.error.as_deref(), Some("license_suspended"));
}

#[tokio::test]
async fn validate_license_propagates_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/license/validate"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = LicenseClient::new(&config(&server)).unwrap();
    assert!(matches!(
        client.validate_license().await,
        Err(FederationError::Api { status: 502, .. })
    ));
}

#[tokio::test]
async fn client_requires_license_key() {
    let server = MockServer::start().await;
    let mut config = config(&server);
    config.license_key = None;
    assert!(matches!(
        LicenseClient::new(&config),
        Err(FederationError::NotConfigured)
    ));
}

#[tokio::test]
async fn heartbeat_posts_counters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/license/heartbeat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "updateAvailable": true,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = LicenseClient::new(&config(&server)).unwrap();
    let outcome = client
        .send_heartbeat(&HeartbeatStats {
            event_count: 2,
            submission_count: 40,
            speaker_count: 25,
        })
        .await
        .unwrap();
    assert!(outcome.success);
    assert!(outcome.update_available);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["eventCount"], 2);
    assert_eq!(body["speakerCount"], 25);
}

#[tokio::test]
async fn register_event_returns_shared_secret() {
    let server = MockServer::start().await;
    let federated_event_id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/events/register"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "federatedEventId": federated_event_id,
            "webhookSecret": "whsec_abc123",
        })))
        .mount(&server)
        .await;

    let client = LicenseClient::new(&config(&server)).unwrap();
    let registration = client
        .register_event(Uuid::new_v4(), "RustConf 2026", "http://localhost:3000/hooks")
        .await
        .unwrap();
    assert_eq!(registration.federated_event_id, federated_event_id);
    assert!(registration.webhook_secret.starts_with("whsec_"));
}

// --- Consent client ---

fn profile_path(speaker_id: Uuid) -> String {
    format!("/speakers/{speaker_id}/profile")
}

#[tokio::test]
async fn consent_fetch_sends_bearer_token() {
    let server = MockServer::start().await;
    let speaker_id = Uuid::new_v4();
    Mock::given(method("GET"))
        .and(path(profile_path(speaker_id)))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "speaker": {
                "id": speaker_id,
                "name": "Ada",
                "scopes": ["profile", "materials"],
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ConsentClient::new(&config(&server)).unwrap();
    let scopes = client.validate_consent_token("tok-1", speaker_id).await.unwrap();
    assert_eq!(scopes, vec!["profile", "materials"]);
}

#[tokio::test]
async fn consent_maps_expired_token() {
    let server = MockServer::start().await;
    let speaker_id = Uuid::new_v4();
    Mock::given(method("GET"))
        .and(path(profile_path(speaker_id)))
        .respond_with(ResponseTemplate::new(401).set_body_string("consent token expired"))
        .mount(&server)
        .await;

    let client = ConsentClient::new(&config(&server)).unwrap();
    assert!(matches!(
        client.validate_consent_token("tok", speaker_id).await,
        Err(ConsentError::Validation(ConsentFailure::Expired))
    ));
}

#[tokio::test]
async fn consent_maps_invalid_revoked_and_missing() {
    let server = MockServer::start().await;
    let invalid = Uuid::new_v4();
    let revoked = Uuid::new_v4();
    let missing = Uuid::new_v4();
    Mock::given(method("GET"))
        .and(path(profile_path(invalid)))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(profile_path(revoked)))
        .respond_with(ResponseTemplate::new(403).set_body_string("consent revoked by speaker"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(profile_path(missing)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = ConsentClient::new(&config(&server)).unwrap();
    assert!(matches!(
        client.validate_consent_token("t", invalid).await,
        Err(ConsentError::Validation(ConsentFailure::InvalidToken))
    ));
    assert!(matches!(
        client.validate_consent_token("t", revoked).await,
        Err(ConsentError::Validation(ConsentFailure::Revoked))
    ));
    assert!(matches!(
        client.validate_consent_token("t", missing).await,
        Err(ConsentError::Validation(ConsentFailure::NotFound))
    ));
}

#[tokio::test]
async fn download_rejects_internal_urls_before_any_request() {
    let server = MockServer::start().await;
    let client = ConsentClient::new(&config(&server)).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("file.bin");

    for url in [
        "http://169.254.169.254/latest/meta-data",
        "http://10.0.0.5/file.pdf",
        "http://localhost/file.pdf",
        "file:///etc/passwd",
    ] {
        assert!(matches!(
            client.download_material(url, &dest).await,
            Err(FederationError::RejectedUrl(_))
        ));
    }
    assert!(server.received_requests().await.unwrap().is_empty());
    assert!(!dest.exists());
}

#[tokio::test]
async fn download_writes_file_to_destination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/slides.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7 test".to_vec()))
        .mount(&server)
        .await;

    let client = ConsentClient::new(&config(&server)).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("event").join("speaker").join("slides.pdf");

    let written = client
        .download_material(&format!("{}/files/slides.pdf", server.uri()), &dest)
        .await
        .unwrap();
    assert_eq!(written, 13);
    assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.7 test");
}
