//! Stateless client for the directory licensing API.
//!
//! Every request carries the instance's license key and public URL as
//! identity headers. Expected validation failures (bad or expired license)
//! come back as a typed outcome; transport failures and unexpected
//! statuses surface as errors for the caller to handle.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use lectern_core::FederationConfig;

use crate::error::{FederationError, FederationResult};

/// Header carrying the license key.
pub const LICENSE_KEY_HEADER: &str = "x-license-key";

/// Header carrying the public URL of this instance.
pub const APP_URL_HEADER: &str = "x-app-url";

/// Per-request timeout for licensing calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Immutable license snapshot returned by the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseInfo {
    pub tier: String,
    pub status: String,
    #[serde(default)]
    pub organization_name: Option<String>,
    /// Feature flags gating directory functionality.
    #[serde(default)]
    pub features: HashMap<String, bool>,
    /// Numeric limits (events, speakers, ...).
    #[serde(default)]
    pub limits: HashMap<String, i64>,
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Outcome of a license validation call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub valid: bool,
    #[serde(default)]
    pub license: Option<LicenseInfo>,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Instance counters sent with each heartbeat.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatStats {
    pub event_count: i64,
    pub submission_count: i64,
    pub speaker_count: i64,
}

/// Outcome of a heartbeat call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatOutcome {
    pub success: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub update_available: bool,
}

/// Outcome of registering an event with the directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRegistration {
    pub federated_event_id: Uuid,
    /// Shared webhook secret for this event (`whsec_` prefixed).
    pub webhook_secret: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterEventRequest<'a> {
    event_id: Uuid,
    name: &'a str,
    callback_url: &'a str,
}

/// Client for the directory licensing API.
#[derive(Debug, Clone)]
pub struct LicenseClient {
    http: reqwest::Client,
    api_url: String,
}

impl LicenseClient {
    /// Build a client from the federation configuration.
    ///
    /// Returns [`FederationError::NotConfigured`] when no license key is set.
    pub fn new(config: &FederationConfig) -> FederationResult<Self> {
        let license_key = config
            .license_key
            .as_deref()
            .ok_or(FederationError::NotConfigured)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            LICENSE_KEY_HEADER,
            HeaderValue::from_str(license_key).map_err(|_| {
                FederationError::InvalidResponse("license key is not a valid header".to_string())
            })?,
        );
        headers.insert(
            APP_URL_HEADER,
            HeaderValue::from_str(&config.app_url).map_err(|_| {
                FederationError::InvalidResponse("app URL is not a valid header".to_string())
            })?,
        );

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("lectern/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Validate the configured license.
    ///
    /// 2xx and 4xx responses parse into a [`ValidationOutcome`]; 4xx means
    /// an expected failure (`valid: false` with an error code). 5xx and
    /// transport failures are errors.
    pub async fn validate_license(&self) -> FederationResult<ValidationOutcome> {
        let url = format!("{}/license/validate", self.api_url);
        let response = self.http.post(&url).send().await?;
        let status = response.status();

        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(FederationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let outcome: ValidationOutcome = response
            .json()
            .await
            .map_err(|e| FederationError::InvalidResponse(e.to_string()))?;

        if !outcome.valid {
            tracing::warn!(
                target: "lectern::federation",
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "license validation rejected"
            );
        }

        Ok(outcome)
    }

    /// Post instance counters to the directory.
    pub async fn send_heartbeat(&self, stats: &HeartbeatStats) -> FederationResult<HeartbeatOutcome> {
        let url = format!("{}/license/heartbeat", self.api_url);
        let response = self.http.post(&url).json(stats).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FederationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| FederationError::InvalidResponse(e.to_string()))
    }

    /// Register an event with the directory.
    ///
    /// Returns the directory-assigned event id and the shared webhook
    /// secret. Transport and status failures propagate to the caller.
    pub async fn register_event(
        &self,
        event_id: Uuid,
        name: &str,
        callback_url: &str,
    ) -> FederationResult<EventRegistration> {
        let url = format!("{}/events/register", self.api_url);
        let response = self
            .http
            .post(&url)
            .json(&RegisterEventRequest {
                event_id,
                name,
                callback_url,
            })
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FederationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| FederationError::InvalidResponse(e.to_string()))
    }

    /// Remove an event registration from the directory.
    pub async fn unregister_event(&self, federated_event_id: Uuid) -> FederationResult<()> {
        let url = format!("{}/events/{federated_event_id}", self.api_url);
        let response = self.http.delete(&url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FederationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_license_key() {
        let mut config = FederationConfig::for_tests("https://example.com");
        config.license_key = None;
        assert!(matches!(
            LicenseClient::new(&config),
            Err(FederationError::NotConfigured)
        ));
    }

    #[test]
    fn test_api_url_trailing_slash_trimmed() {
        let config = FederationConfig::for_tests("https://example.com/api/v1/");
        let client = LicenseClient::new(&config).unwrap();
        assert_eq!(client.api_url, "https://example.com/api/v1");
    }

    #[test]
    fn test_license_info_parses_minimal_payload() {
        let info: LicenseInfo = serde_json::from_str(r#"{"tier":"pro","status":"active"}"#).unwrap();
        assert_eq!(info.tier, "pro");
        assert!(info.features.is_empty());
        assert!(info.expires_at.is_none());
    }

    #[test]
    fn test_validation_outcome_parses_failure_shape() {
        let outcome: ValidationOutcome =
            serde_json::from_str(r#"{"valid":false,"error":"license_expired"}"#).unwrap();
        assert!(!outcome.valid);
        assert_eq!(outcome.error.as_deref(), Some("license_expired"));
    }
}
