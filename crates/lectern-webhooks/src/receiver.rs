//! Inbound webhook verification and dispatch.
//!
//! Verifies the signature and replay window before anything else touches
//! the payload, then dispatches to idempotent handlers. Deliveries may
//! arrive out of order or more than once; correctness relies on the
//! external message id and on consent scopes, not on sequence.

use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use lectern_db::models::{direction, EventFederation, NewFederatedMessage};
use lectern_db::{EventFederationStore, MessageStore, SpeakerStore};

use crate::crypto;
use crate::error::{WebhookError, WebhookResult};
use crate::models::{
    WebhookEventType, WebhookPayload, WEBHOOK_ID_HEADER, WEBHOOK_SIGNATURE_HEADER,
    WEBHOOK_TIMESTAMP_HEADER,
};

/// Replay window around the signing timestamp.
const REPLAY_WINDOW_MS: i64 = 5 * 60 * 1000;

/// Grace period before revoked speaker data is deleted, when the remote
/// side does not supply a deadline.
const DEFAULT_DELETION_GRACE: Duration = Duration::days(30);

/// Verify a webhook signature and its replay window.
///
/// The header must be `sha256=<hex>`; the timestamp (epoch milliseconds)
/// must be within ±5 minutes of now; the signature covers
/// `{timestamp}.{body}` and is compared in constant time.
pub fn verify_webhook_signature(
    signature_header: &str,
    timestamp: &str,
    body: &[u8],
    secret: &str,
) -> WebhookResult<()> {
    let Some(signature_hex) = signature_header.strip_prefix("sha256=") else {
        return Err(WebhookError::InvalidSignature);
    };

    let ts_ms: i64 = timestamp
        .parse()
        .map_err(|_| WebhookError::InvalidPayload("timestamp is not numeric".to_string()))?;
    let skew = (Utc::now().timestamp_millis() - ts_ms).abs();
    if skew > REPLAY_WINDOW_MS {
        return Err(WebhookError::ReplayDetected);
    }

    if !crypto::verify_hmac_signature(signature_hex, secret, timestamp, body) {
        return Err(WebhookError::InvalidSignature);
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomingMessage {
    message_id: Uuid,
    #[serde(default)]
    submission_id: Option<Uuid>,
    body: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageReadNotice {
    message_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsentRevocation {
    speaker_id: Uuid,
    #[serde(default)]
    deletion_deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileUpdate {
    speaker_id: Uuid,
    #[serde(default, alias = "scopes")]
    consent_scopes: Vec<String>,
}

/// Inbound webhook verifier and dispatcher.
#[derive(Clone)]
pub struct WebhookReceiver {
    events: Arc<dyn EventFederationStore>,
    messages: Arc<dyn MessageStore>,
    speakers: Arc<dyn SpeakerStore>,
    encryption_key: Option<[u8; 32]>,
}

impl WebhookReceiver {
    pub fn new(
        events: Arc<dyn EventFederationStore>,
        messages: Arc<dyn MessageStore>,
        speakers: Arc<dyn SpeakerStore>,
        encryption_key: Option<[u8; 32]>,
    ) -> Self {
        Self {
            events,
            messages,
            speakers,
            encryption_key,
        }
    }

    /// Verify an inbound request: extract headers, parse the envelope,
    /// resolve the target event, and check the signature.
    ///
    /// When `event_id` is given (path-scoped endpoint) the registration is
    /// resolved by local event id; otherwise by the envelope's federated
    /// event id.
    pub async fn verify_incoming_webhook(
        &self,
        headers: &HeaderMap,
        body: &[u8],
        event_id: Option<Uuid>,
    ) -> WebhookResult<(WebhookPayload, EventFederation)> {
        let _webhook_id = header_str(headers, WEBHOOK_ID_HEADER)?;
        let timestamp = header_str(headers, WEBHOOK_TIMESTAMP_HEADER)?;
        let signature = header_str(headers, WEBHOOK_SIGNATURE_HEADER)?;

        let payload: WebhookPayload = serde_json::from_slice(body)
            .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

        let registration = match event_id {
            Some(id) => self.events.find_by_event(id).await?,
            None => {
                self.events
                    .find_by_federated_event(payload.federated_event_id)
                    .await?
            }
        }
        .ok_or(WebhookError::UnknownEvent)?;

        let secret = crypto::reveal_secret(
            &registration.webhook_secret_encrypted,
            self.encryption_key.as_ref(),
        )?;

        verify_webhook_signature(signature, timestamp, body, &secret)?;

        Ok((payload, registration))
    }

    /// Apply a verified payload. Returns a JSON acknowledgement body.
    pub async fn dispatch(
        &self,
        payload: &WebhookPayload,
        registration: &EventFederation,
    ) -> WebhookResult<serde_json::Value> {
        tracing::info!(
            target: "lectern::webhooks",
            payload_id = %payload.id,
            event_type = %payload.event_type,
            event_id = %registration.event_id,
            "inbound webhook accepted"
        );

        match payload.event_type {
            WebhookEventType::MessageSent => {
                let message_id = self
                    .handle_incoming_message(&payload.data, registration)
                    .await?;
                Ok(serde_json::json!({"status": "ok", "messageId": message_id}))
            }
            WebhookEventType::MessageRead => {
                self.handle_message_read(&payload.data).await?;
                Ok(serde_json::json!({"status": "ok"}))
            }
            WebhookEventType::SpeakerConsentRevoked => {
                self.handle_consent_revocation(&payload.data).await?;
                Ok(serde_json::json!({"status": "ok"}))
            }
            WebhookEventType::SpeakerProfileUpdated => {
                self.handle_profile_update(&payload.data).await?;
                Ok(serde_json::json!({"status": "ok"}))
            }
            // Submission events flow outbound only; acknowledge so the
            // remote side does not retry.
            other => {
                tracing::debug!(
                    target: "lectern::webhooks",
                    event_type = %other,
                    "ignoring unsupported inbound event type"
                );
                Ok(serde_json::json!({"status": "ignored"}))
            }
        }
    }

    /// Store a remote speaker message. Idempotent on the external message
    /// id: a repeat delivery returns the existing local id.
    pub async fn handle_incoming_message(
        &self,
        data: &serde_json::Value,
        registration: &EventFederation,
    ) -> WebhookResult<Uuid> {
        let incoming: IncomingMessage = serde_json::from_value(data.clone())
            .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

        if let Some(existing) = self
            .messages
            .find_by_external_id(incoming.message_id)
            .await?
        {
            tracing::debug!(
                target: "lectern::webhooks",
                external_message_id = %incoming.message_id,
                local_id = %existing.id,
                "duplicate message delivery, returning existing"
            );
            return Ok(existing.id);
        }

        let created = self
            .messages
            .create(NewFederatedMessage {
                event_id: registration.event_id,
                submission_id: incoming.submission_id,
                external_message_id: Some(incoming.message_id),
                direction: direction::SPEAKER.to_string(),
                body: incoming.body,
            })
            .await?;
        Ok(created.id)
    }

    /// Mark a locally sent message as read by the remote side.
    async fn handle_message_read(&self, data: &serde_json::Value) -> WebhookResult<()> {
        let notice: MessageReadNotice = serde_json::from_value(data.clone())
            .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
        self.messages
            .mark_read_by_external_id(notice.message_id)
            .await?;
        Ok(())
    }

    /// Clear local consent scopes immediately; deletion of the row itself
    /// is deferred to the deadline sweep.
    pub async fn handle_consent_revocation(&self, data: &serde_json::Value) -> WebhookResult<()> {
        let revocation: ConsentRevocation = serde_json::from_value(data.clone())
            .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

        let deadline = revocation
            .deletion_deadline
            .unwrap_or_else(|| Utc::now() + DEFAULT_DELETION_GRACE);

        match self
            .speakers
            .revoke_consent(revocation.speaker_id, Some(deadline))
            .await?
        {
            Some(_) => {
                tracing::info!(
                    target: "lectern::webhooks",
                    federated_speaker_id = %revocation.speaker_id,
                    deletion_deadline = %deadline,
                    "consent revoked, deletion scheduled"
                );
            }
            None => {
                tracing::debug!(
                    target: "lectern::webhooks",
                    federated_speaker_id = %revocation.speaker_id,
                    "revocation for unknown speaker, nothing to do"
                );
            }
        }
        Ok(())
    }

    /// Replace consent scopes after a remote profile update.
    async fn handle_profile_update(&self, data: &serde_json::Value) -> WebhookResult<()> {
        let update: ProfileUpdate = serde_json::from_value(data.clone())
            .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
        self.speakers
            .update_consent_scopes(update.speaker_id, &update.consent_scopes)
            .await?;
        Ok(())
    }
}

fn header_str<'h>(headers: &'h HeaderMap, name: &'static str) -> WebhookResult<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingHeader(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_db::{
        MemoryEventFederationStore, MemoryMessageStore, MemorySpeakerStore,
    };
    use lectern_db::models::NewFederatedSpeaker;

    fn receiver() -> (WebhookReceiver, Arc<MemoryEventFederationStore>) {
        let events = Arc::new(MemoryEventFederationStore::new());
        let receiver = WebhookReceiver::new(
            events.clone(),
            Arc::new(MemoryMessageStore::new()),
            Arc::new(MemorySpeakerStore::new()),
            None,
        );
        (receiver, events)
    }

    async fn register(
        events: &MemoryEventFederationStore,
        secret: &str,
    ) -> EventFederation {
        events
            .create(
                Uuid::new_v4(),
                Uuid::new_v4(),
                "https://dir.example/hook",
                secret,
            )
            .await
            .unwrap()
    }

    fn signed_headers(secret: &str, body: &[u8]) -> HeaderMap {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = crypto::compute_hmac_signature(secret, &timestamp, body);
        let mut headers = HeaderMap::new();
        headers.insert(WEBHOOK_ID_HEADER, Uuid::new_v4().to_string().parse().unwrap());
        headers.insert(WEBHOOK_TIMESTAMP_HEADER, timestamp.parse().unwrap());
        headers.insert(
            WEBHOOK_SIGNATURE_HEADER,
            format!("sha256={signature}").parse().unwrap(),
        );
        headers
    }

    // --- Signature verification ---

    #[test]
    fn test_verify_signature_roundtrip() {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let body = br#"{"hello":"world"}"#;
        let sig = crypto::compute_hmac_signature("secret", &timestamp, body);
        assert!(
            verify_webhook_signature(&format!("sha256={sig}"), &timestamp, body, "secret").is_ok()
        );
    }

    #[test]
    fn test_verify_rejects_missing_prefix() {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let sig = crypto::compute_hmac_signature("secret", &timestamp, b"body");
        assert!(matches!(
            verify_webhook_signature(&sig, &timestamp, b"body", "secret"),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn test_verify_rejects_stale_timestamp() {
        let stale = (Utc::now() - Duration::minutes(6)).timestamp_millis().to_string();
        let sig = crypto::compute_hmac_signature("secret", &stale, b"body");
        assert!(matches!(
            verify_webhook_signature(&format!("sha256={sig}"), &stale, b"body", "secret"),
            Err(WebhookError::ReplayDetected)
        ));
    }

    #[test]
    fn test_verify_rejects_future_timestamp() {
        let future = (Utc::now() + Duration::minutes(6)).timestamp_millis().to_string();
        let sig = crypto::compute_hmac_signature("secret", &future, b"body");
        assert!(matches!(
            verify_webhook_signature(&format!("sha256={sig}"), &future, b"body", "secret"),
            Err(WebhookError::ReplayDetected)
        ));
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let sig = crypto::compute_hmac_signature("secret", &timestamp, b"body");
        assert!(matches!(
            verify_webhook_signature(&format!("sha256={sig}"), &timestamp, b"body", "other"),
            Err(WebhookError::InvalidSignature)
        ));
    }

    // --- Full verification ---

    #[tokio::test]
    async fn test_verify_incoming_accepts_signed_request() {
        let (receiver, events) = receiver();
        let registration = register(&events, "whsec_test").await;

        let payload = WebhookPayload::new(
            WebhookEventType::MessageSent,
            registration.federated_event_id,
            serde_json::json!({"messageId": Uuid::new_v4(), "body": "hi"}),
        );
        let body = serde_json::to_vec(&payload).unwrap();
        let headers = signed_headers("whsec_test", &body);

        let (parsed, resolved) = receiver
            .verify_incoming_webhook(&headers, &body, None)
            .await
            .unwrap();
        assert_eq!(parsed.id, payload.id);
        assert_eq!(resolved.event_id, registration.event_id);
    }

    #[tokio::test]
    async fn test_verify_incoming_rejects_unknown_event() {
        let (receiver, _) = receiver();
        let payload = WebhookPayload::new(
            WebhookEventType::MessageSent,
            Uuid::new_v4(),
            serde_json::json!({}),
        );
        let body = serde_json::to_vec(&payload).unwrap();
        let headers = signed_headers("whsec_test", &body);

        assert!(matches!(
            receiver.verify_incoming_webhook(&headers, &body, None).await,
            Err(WebhookError::UnknownEvent)
        ));
    }

    #[tokio::test]
    async fn test_verify_incoming_requires_headers() {
        let (receiver, events) = receiver();
        let registration = register(&events, "whsec_test").await;
        let payload = WebhookPayload::new(
            WebhookEventType::MessageSent,
            registration.federated_event_id,
            serde_json::json!({}),
        );
        let body = serde_json::to_vec(&payload).unwrap();

        assert!(matches!(
            receiver
                .verify_incoming_webhook(&HeaderMap::new(), &body, None)
                .await,
            Err(WebhookError::MissingHeader(_))
        ));
    }

    // --- Handlers ---

    #[tokio::test]
    async fn test_incoming_message_is_idempotent() {
        let (receiver, events) = receiver();
        let registration = register(&events, "whsec_test").await;
        let data = serde_json::json!({
            "messageId": Uuid::new_v4(),
            "body": "hello from the directory",
        });

        let first = receiver
            .handle_incoming_message(&data, &registration)
            .await
            .unwrap();
        let second = receiver
            .handle_incoming_message(&data, &registration)
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_consent_revocation_clears_scopes_defers_deletion() {
        let events = Arc::new(MemoryEventFederationStore::new());
        let speakers = Arc::new(MemorySpeakerStore::new());
        let receiver = WebhookReceiver::new(
            events,
            Arc::new(MemoryMessageStore::new()),
            speakers.clone(),
            None,
        );

        let fid = Uuid::new_v4();
        let mut new = NewFederatedSpeaker::placeholder(fid, None);
        new.consent_scopes = vec!["profile".to_string()];
        speakers.create(new).await.unwrap();

        receiver
            .handle_consent_revocation(&serde_json::json!({"speakerId": fid}))
            .await
            .unwrap();

        // Scopes cleared, row still present with a future deadline.
        let row = speakers.find_by_federated_id(fid).await.unwrap().unwrap();
        assert!(row.consent_scopes.is_empty());
        assert!(row.deletion_deadline.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_dispatch_ignores_outbound_only_types() {
        let (receiver, events) = receiver();
        let registration = register(&events, "whsec_test").await;
        let payload = WebhookPayload::new(
            WebhookEventType::SubmissionCreated,
            registration.federated_event_id,
            serde_json::json!({}),
        );
        let ack = receiver.dispatch(&payload, &registration).await.unwrap();
        assert_eq!(ack["status"], "ignored");
    }
}
