//! Error types for webhook delivery and receipt.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Result alias for webhook operations.
pub type WebhookResult<T> = Result<T, WebhookError>;

/// Errors raised by webhook services.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The event has no federation registration.
    #[error("Event is not federated")]
    NotFederated,

    /// Precondition on a typed sender failed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A required webhook header is missing.
    #[error("Missing header: {0}")]
    MissingHeader(&'static str),

    /// Signature verification failed.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Timestamp outside the replay window.
    #[error("Webhook timestamp outside the allowed window")]
    ReplayDetected,

    /// Request body is not a valid envelope.
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    /// No registration matches the target event.
    #[error("Unknown federated event")]
    UnknownEvent,

    /// Queue entry not found.
    #[error("Webhook queue entry not found")]
    QueueEntryNotFound,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Delivery failed after exhausting retries.
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] lectern_db::StoreError),
}

impl WebhookError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFederated | Self::Validation(_) | Self::InvalidPayload(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::MissingHeader(_) | Self::InvalidSignature | Self::ReplayDetected => {
                StatusCode::UNAUTHORIZED
            }
            Self::UnknownEvent | Self::QueueEntryNotFound => StatusCode::NOT_FOUND,
            Self::EncryptionFailed(_)
            | Self::DeliveryFailed(_)
            | Self::Http(_)
            | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFederated => "not_federated",
            Self::Validation(_) => "validation_error",
            Self::MissingHeader(_) => "missing_header",
            Self::InvalidSignature => "invalid_signature",
            Self::ReplayDetected => "replay_detected",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::UnknownEvent => "unknown_event",
            Self::QueueEntryNotFound => "not_found",
            Self::EncryptionFailed(_) => "encryption_failed",
            Self::DeliveryFailed(_) => "delivery_failed",
            Self::Http(_) => "upstream_error",
            Self::Store(_) => "internal_error",
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal errors are logged but not echoed to the caller.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(target: "lectern::webhooks", error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": self.error_code(),
            "message": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
