//! Error types for the federation crate.

use thiserror::Error;

/// Result alias for federation operations.
pub type FederationResult<T> = Result<T, FederationError>;

/// Errors raised by federation services.
#[derive(Debug, Error)]
pub enum FederationError {
    /// Federation is not configured (no license key).
    #[error("Federation is not configured")]
    NotConfigured,

    /// Federation is configured but disabled or the license is invalid.
    #[error("Federation is not active: {0}")]
    NotActive(String),

    /// Transport-layer failure talking to the directory API.
    #[error("Directory API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Directory API returned an unexpected status.
    #[error("Directory API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// Remote response could not be interpreted.
    #[error("Unexpected directory API response: {0}")]
    InvalidResponse(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// URL failed SSRF or scheme validation.
    #[error("Rejected URL: {0}")]
    RejectedUrl(String),

    /// Material download exceeded size or timeout limits.
    #[error("Download limit exceeded: {0}")]
    DownloadLimit(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Consent(#[from] ConsentError),

    #[error(transparent)]
    Store(#[from] lectern_db::StoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Typed consent-token validation failures.
///
/// These are expected outcomes of talking to the directory with a
/// user-supplied token and are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentFailure {
    /// Token is malformed or does not match the speaker.
    InvalidToken,
    /// Token was valid once but has expired.
    Expired,
    /// The speaker revoked consent after the token was issued.
    Revoked,
    /// Speaker or consent grant not found.
    NotFound,
}

impl ConsentFailure {
    /// Machine-readable code used in responses and logs.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidToken => "invalid_token",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::NotFound => "not_found",
        }
    }
}

/// Errors from the consent client.
#[derive(Debug, Error)]
pub enum ConsentError {
    /// Expected validation failure with a machine-readable code.
    #[error("Consent validation failed: {}", .0.code())]
    Validation(ConsentFailure),

    /// Directory returned an unexpected status.
    #[error("Directory API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Directory API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected profile response: {0}")]
    InvalidResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consent_failure_codes() {
        assert_eq!(ConsentFailure::InvalidToken.code(), "invalid_token");
        assert_eq!(ConsentFailure::Expired.code(), "expired");
        assert_eq!(ConsentFailure::Revoked.code(), "revoked");
        assert_eq!(ConsentFailure::NotFound.code(), "not_found");
    }

    #[test]
    fn test_error_display() {
        let err = FederationError::Api {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert!(err.to_string().contains("502"));
    }
}
