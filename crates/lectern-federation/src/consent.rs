//! Consent-token validation, profile fetch, and material download.
//!
//! Consent tokens are opaque bearer credentials issued by the directory;
//! validity is always determined remotely. Profile payloads arrive in a
//! few historical shapes, normalized here by an adapter that tries known
//! shapes in a fixed priority order.

use futures_util::StreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use lectern_core::FederationConfig;

use crate::error::{ConsentError, ConsentFailure, FederationError, FederationResult};
use crate::validation::validate_material_url;

/// Per-request timeout for profile and validation calls.
const API_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a material download.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Size ceiling for a material download.
const MAX_DOWNLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// A normalized speaker profile from the directory.
#[derive(Debug, Clone)]
pub struct SpeakerProfile {
    pub federated_speaker_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub social_links: Option<serde_json::Value>,
    pub experience: Option<String>,
    /// Scopes the speaker granted; empty means non-consenting.
    pub consent_scopes: Vec<String>,
    pub materials: Vec<MaterialRef>,
    pub co_speakers: Vec<CoSpeaker>,
}

/// A material file referenced by a profile.
#[derive(Debug, Clone, Deserialize)]
pub struct MaterialRef {
    #[serde(alias = "fileName", alias = "filename")]
    pub name: String,
    #[serde(alias = "fileUrl", alias = "downloadUrl")]
    pub url: String,
}

/// A co-speaker attached to a profile.
///
/// Linked co-speakers carry their own directory id and get a local
/// placeholder record; guests are recorded as metadata only.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoSpeaker {
    #[serde(default, alias = "speakerId", alias = "id")]
    pub federated_speaker_id: Option<Uuid>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl CoSpeaker {
    /// Whether this co-speaker has their own directory identity.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.federated_speaker_id.is_some()
    }
}

// Raw wire shape shared by all envelope variants. Field aliases cover the
// legacy payload names still emitted by older directory versions.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProfile {
    #[serde(alias = "speakerId")]
    id: Uuid,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default, alias = "jobTitle")]
    position: Option<String>,
    #[serde(default, alias = "socials")]
    social_links: Option<serde_json::Value>,
    #[serde(default)]
    experience: Option<String>,
    #[serde(default, alias = "scopes")]
    consent_scopes: Vec<String>,
    #[serde(default)]
    materials: Vec<MaterialRef>,
    #[serde(default, alias = "co_speakers")]
    co_speakers: Vec<CoSpeaker>,
}

#[derive(Debug, Deserialize)]
struct SpeakerEnvelope {
    speaker: RawProfile,
}

#[derive(Debug, Deserialize)]
struct ProfileEnvelope {
    profile: RawProfile,
}

impl From<RawProfile> for SpeakerProfile {
    fn from(raw: RawProfile) -> Self {
        Self {
            federated_speaker_id: raw.id,
            name: raw.name,
            email: raw.email,
            bio: raw.bio,
            location: raw.location,
            company: raw.company,
            position: raw.position,
            social_links: raw.social_links,
            experience: raw.experience,
            consent_scopes: raw.consent_scopes,
            materials: raw.materials,
            co_speakers: raw.co_speakers,
        }
    }
}

/// Normalize a profile response body.
///
/// Tries known envelope shapes in priority order: `{speaker: ...}`, then
/// `{profile: ...}`, then a flat profile object. The order is load-bearing
/// for backward compatibility with older directory versions.
fn parse_profile(body: &str) -> Result<SpeakerProfile, ConsentError> {
    if let Ok(envelope) = serde_json::from_str::<SpeakerEnvelope>(body) {
        return Ok(envelope.speaker.into());
    }
    if let Ok(envelope) = serde_json::from_str::<ProfileEnvelope>(body) {
        return Ok(envelope.profile.into());
    }
    serde_json::from_str::<RawProfile>(body)
        .map(Into::into)
        .map_err(|e| ConsentError::InvalidResponse(e.to_string()))
}

/// Client for consent validation, profile fetch, and material download.
#[derive(Debug, Clone)]
pub struct ConsentClient {
    http: reqwest::Client,
    download: reqwest::Client,
    api_url: String,
    allow_http: bool,
}

impl ConsentClient {
    pub fn new(config: &FederationConfig) -> FederationResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .user_agent(concat!("lectern/", env!("CARGO_PKG_VERSION")))
            .build()?;

        // Downloads never follow redirects: a redirect could bounce an
        // approved public URL to an internal address.
        let download = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .user_agent(concat!("lectern/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            download,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            allow_http: config.development,
        })
    }

    /// Validate a consent token against the directory.
    ///
    /// Success returns the granted scopes. Failures map to typed codes:
    /// 401 is an invalid or expired token, 403 a revoked or missing grant,
    /// 404 an unknown speaker.
    pub async fn validate_consent_token(
        &self,
        token: &str,
        speaker_id: Uuid,
    ) -> Result<Vec<String>, ConsentError> {
        let profile = self.fetch_speaker_profile(token, speaker_id).await?;
        Ok(profile.consent_scopes)
    }

    /// Fetch the speaker profile scoped to consented fields.
    pub async fn fetch_speaker_profile(
        &self,
        token: &str,
        speaker_id: Uuid,
    ) -> Result<SpeakerProfile, ConsentError> {
        let url = format!("{}/speakers/{speaker_id}/profile", self.api_url);
        let response = self.http.get(&url).bearer_auth(token).send().await?;
        let status = response.status();
        let body = response.text().await?;

        match status {
            s if s.is_success() => parse_profile(&body),
            StatusCode::UNAUTHORIZED => {
                let failure = if body.contains("expired") {
                    ConsentFailure::Expired
                } else {
                    ConsentFailure::InvalidToken
                };
                Err(ConsentError::Validation(failure))
            }
            StatusCode::FORBIDDEN => {
                let failure = if body.contains("revoked") {
                    ConsentFailure::Revoked
                } else {
                    ConsentFailure::NotFound
                };
                Err(ConsentError::Validation(failure))
            }
            StatusCode::NOT_FOUND => Err(ConsentError::Validation(ConsentFailure::NotFound)),
            s => Err(ConsentError::Api {
                status: s.as_u16(),
                body,
            }),
        }
    }

    /// Download a material file to `dest`.
    ///
    /// The URL is SSRF-validated before any network call. Enforces the
    /// size ceiling twice: against the Content-Length header and against
    /// the bytes actually received. Returns the byte count written.
    pub async fn download_material(&self, url: &str, dest: &Path) -> FederationResult<u64> {
        let validated = validate_material_url(url, self.allow_http)?;

        let response = self.download.get(validated).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FederationError::Api {
                status: status.as_u16(),
                body: format!("material download returned {status}"),
            });
        }

        if let Some(length) = response.content_length() {
            if length > MAX_DOWNLOAD_BYTES {
                return Err(FederationError::DownloadLimit(format!(
                    "declared size {length} exceeds {MAX_DOWNLOAD_BYTES} bytes"
                )));
            }
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            if written > MAX_DOWNLOAD_BYTES {
                drop(file);
                let _ = tokio::fs::remove_file(dest).await;
                return Err(FederationError::DownloadLimit(format!(
                    "received more than {MAX_DOWNLOAD_BYTES} bytes"
                )));
            }
            tokio::io::AsyncWriteExt::write_all(&mut file, &chunk).await?;
        }
        tokio::io::AsyncWriteExt::flush(&mut file).await?;

        tracing::debug!(
            target: "lectern::federation",
            url,
            bytes = written,
            "material downloaded"
        );
        Ok(written)
    }
}
