//! Webhook wire types.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header carrying the payload id.
pub const WEBHOOK_ID_HEADER: &str = "x-webhook-id";

/// Header carrying the signing timestamp (epoch milliseconds, as string).
pub const WEBHOOK_TIMESTAMP_HEADER: &str = "x-webhook-timestamp";

/// Header carrying the signature (`sha256=<hex>`).
pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Event types exchanged over federation webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEventType {
    #[serde(rename = "submission.created")]
    SubmissionCreated,
    #[serde(rename = "submission.updated")]
    SubmissionUpdated,
    #[serde(rename = "submission.status_updated")]
    SubmissionStatusUpdated,
    #[serde(rename = "message.sent")]
    MessageSent,
    #[serde(rename = "message.read")]
    MessageRead,
    #[serde(rename = "speaker.profile_updated")]
    SpeakerProfileUpdated,
    #[serde(rename = "speaker.consent_revoked")]
    SpeakerConsentRevoked,
}

impl WebhookEventType {
    /// Convert to the wire string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubmissionCreated => "submission.created",
            Self::SubmissionUpdated => "submission.updated",
            Self::SubmissionStatusUpdated => "submission.status_updated",
            Self::MessageSent => "message.sent",
            Self::MessageRead => "message.read",
            Self::SpeakerProfileUpdated => "speaker.profile_updated",
            Self::SpeakerConsentRevoked => "speaker.consent_revoked",
        }
    }

    /// Parse from the wire string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "submission.created" => Some(Self::SubmissionCreated),
            "submission.updated" => Some(Self::SubmissionUpdated),
            "submission.status_updated" => Some(Self::SubmissionStatusUpdated),
            "message.sent" => Some(Self::MessageSent),
            "message.read" => Some(Self::MessageRead),
            "speaker.profile_updated" => Some(Self::SpeakerProfileUpdated),
            "speaker.consent_revoked" => Some(Self::SpeakerConsentRevoked),
            _ => None,
        }
    }

    /// All known event types.
    #[must_use]
    pub fn all() -> &'static [Self] {
        &[
            Self::SubmissionCreated,
            Self::SubmissionUpdated,
            Self::SubmissionStatusUpdated,
            Self::MessageSent,
            Self::MessageRead,
            Self::SpeakerProfileUpdated,
            Self::SpeakerConsentRevoked,
        ]
    }
}

impl std::fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The signed webhook envelope. Immutable once signed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Unique payload id, also sent as `X-Webhook-Id`.
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: WebhookEventType,
    /// Epoch milliseconds at signing time.
    pub timestamp: i64,
    pub federated_event_id: Uuid,
    pub data: serde_json::Value,
}

impl WebhookPayload {
    /// Build a fresh envelope stamped with the current time.
    #[must_use]
    pub fn new(
        event_type: WebhookEventType,
        federated_event_id: Uuid,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            timestamp: Utc::now().timestamp_millis(),
            federated_event_id,
            data,
        }
    }
}
