//! Federation configuration.
//!
//! Everything the federation subsystem needs from the host instance is
//! collected here: the license key, the directory API endpoint, the public
//! URL of this instance (sent as app identity and used to build webhook
//! callback URLs), the cron secret guarding maintenance routes, and the
//! at-rest encryption settings.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::path::PathBuf;
use thiserror::Error;

/// Default directory API endpoint.
pub const DEFAULT_API_URL: &str = "https://directory.lectern.events/api/v1";

/// Default root directory for downloaded speaker materials.
pub const DEFAULT_UPLOAD_ROOT: &str = "uploads/federation";

/// Configuration errors raised while reading the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

/// Federation subsystem configuration.
///
/// `license_key` being `None` means federation is unconfigured: the state
/// service reports `{is_enabled: false, is_configured: false}` without any
/// network traffic.
#[derive(Debug, Clone)]
pub struct FederationConfig {
    /// License key issued by the directory. `None` = not configured.
    pub license_key: Option<String>,
    /// Base URL of the directory API.
    pub api_url: String,
    /// Public URL of this instance, sent as app identity.
    pub app_url: String,
    /// Shared secret guarding cron/maintenance routes.
    pub cron_secret: Option<String>,
    /// Whether PII fields are encrypted at rest.
    pub encryption_enabled: bool,
    /// 32-byte key for AES-256-GCM at-rest encryption.
    pub encryption_key: Option<[u8; 32]>,
    /// Root directory under which remote materials are stored.
    pub upload_root: PathBuf,
    /// Development mode shortens cache TTLs and allows plain HTTP
    /// to the directory API.
    pub development: bool,
}

impl FederationConfig {
    /// Load configuration from the process environment.
    ///
    /// Reads `LECTERN_LICENSE_KEY`, `LECTERN_FEDERATION_API_URL`,
    /// `LECTERN_APP_URL`, `LECTERN_CRON_SECRET`,
    /// `LECTERN_ENCRYPTION_ENABLED`, `LECTERN_ENCRYPTION_KEY` (base64,
    /// 32 bytes), `LECTERN_UPLOAD_ROOT`, and `LECTERN_ENV`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let development = matches!(
            std::env::var("LECTERN_ENV").as_deref(),
            Ok("development") | Ok("dev") | Err(_)
        );

        let encryption_enabled = match std::env::var("LECTERN_ENCRYPTION_ENABLED").as_deref() {
            Ok("false") | Ok("0") => false,
            Ok(_) => true,
            // Default on in production, off in development.
            Err(_) => !development,
        };

        let encryption_key = match std::env::var("LECTERN_ENCRYPTION_KEY") {
            Ok(encoded) => Some(Self::decode_key(&encoded)?),
            Err(_) => None,
        };

        Ok(Self {
            license_key: std::env::var("LECTERN_LICENSE_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            api_url: std::env::var("LECTERN_FEDERATION_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            app_url: std::env::var("LECTERN_APP_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            cron_secret: std::env::var("LECTERN_CRON_SECRET").ok(),
            encryption_enabled,
            encryption_key,
            upload_root: std::env::var("LECTERN_UPLOAD_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_UPLOAD_ROOT)),
            development,
        })
    }

    /// Decode a base64-encoded 32-byte encryption key.
    fn decode_key(encoded: &str) -> Result<[u8; 32], ConfigError> {
        let bytes = BASE64.decode(encoded).map_err(|e| ConfigError::Invalid {
            var: "LECTERN_ENCRYPTION_KEY",
            message: format!("not valid base64: {e}"),
        })?;
        if bytes.len() != 32 {
            return Err(ConfigError::Invalid {
                var: "LECTERN_ENCRYPTION_KEY",
                message: format!("expected 32 bytes, got {}", bytes.len()),
            });
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(key)
    }

    /// Whether a license key is present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.license_key.is_some()
    }

    /// Minimal configuration for tests: configured, unencrypted, dev mode.
    #[must_use]
    pub fn for_tests(api_url: impl Into<String>) -> Self {
        Self {
            license_key: Some("lk_test_0000".to_string()),
            api_url: api_url.into(),
            app_url: "http://localhost:3000".to_string(),
            cron_secret: None,
            encryption_enabled: false,
            encryption_key: None,
            upload_root: PathBuf::from("uploads/federation"),
            development: true,
        }
    }
}
