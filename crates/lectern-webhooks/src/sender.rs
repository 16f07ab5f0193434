//! Outbound webhook delivery.
//!
//! Builds the signed envelope for an event, POSTs it to the event's
//! registered webhook URL with a short inline retry schedule, and routes
//! exhausted deliveries into the dead-letter queue. Only HTTP 429 and 5xx
//! are retryable; other 4xx responses fail fast.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use lectern_db::models::{direction, EventFederation, FederatedMessage, Submission};
use lectern_db::EventFederationStore;

use crate::crypto;
use crate::dlq::DlqService;
use crate::error::{WebhookError, WebhookResult};
use crate::models::{
    WebhookEventType, WebhookPayload, WEBHOOK_ID_HEADER, WEBHOOK_SIGNATURE_HEADER,
    WEBHOOK_TIMESTAMP_HEADER,
};

/// Per-attempt delivery timeout.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Inline retry delays after the initial attempt.
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(5),
    Duration::from_secs(15),
];

/// Outcome of a delivery, including the attempt that settled it.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub payload_id: Uuid,
    pub delivered: bool,
    pub attempts: u32,
    /// Set when the payload was routed into the retry queue.
    pub queued_entry_id: Option<Uuid>,
}

/// Result of a single HTTP attempt.
enum AttemptOutcome {
    Delivered,
    Retryable(String),
    Fatal(String),
}

/// Outbound webhook sender.
#[derive(Clone)]
pub struct WebhookSender {
    http: reqwest::Client,
    events: Arc<dyn EventFederationStore>,
    dlq: DlqService,
    encryption_key: Option<[u8; 32]>,
}

impl WebhookSender {
    pub fn new(
        events: Arc<dyn EventFederationStore>,
        dlq: DlqService,
        encryption_key: Option<[u8; 32]>,
    ) -> WebhookResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(ATTEMPT_TIMEOUT)
            .user_agent(concat!("lectern/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            events,
            dlq,
            encryption_key,
        })
    }

    /// Build, sign, and deliver a webhook for an event.
    ///
    /// Exhausted retries enqueue the payload for background redelivery and
    /// report `delivered: false` rather than erroring; the caller's write
    /// has already happened and must not roll back on notification
    /// failure.
    pub async fn send_webhook(
        &self,
        event_id: Uuid,
        event_type: WebhookEventType,
        data: serde_json::Value,
    ) -> WebhookResult<DeliveryOutcome> {
        let registration = self
            .events
            .find_by_event(event_id)
            .await?
            .ok_or(WebhookError::NotFederated)?;

        let payload = WebhookPayload::new(event_type, registration.federated_event_id, data);

        let mut attempts = 0u32;
        let mut last_error = String::new();

        for round in 0..=RETRY_DELAYS.len() {
            if round > 0 {
                tokio::time::sleep(RETRY_DELAYS[round - 1]).await;
            }
            attempts += 1;

            match self.attempt_delivery(&registration, &payload).await {
                AttemptOutcome::Delivered => {
                    tracing::info!(
                        target: "lectern::webhooks",
                        payload_id = %payload.id,
                        event_id = %event_id,
                        event_type = %event_type,
                        attempts,
                        "webhook delivered"
                    );
                    return Ok(DeliveryOutcome {
                        payload_id: payload.id,
                        delivered: true,
                        attempts,
                        queued_entry_id: None,
                    });
                }
                AttemptOutcome::Retryable(error) => {
                    tracing::warn!(
                        target: "lectern::webhooks",
                        payload_id = %payload.id,
                        event_id = %event_id,
                        attempt = attempts,
                        error = %error,
                        "webhook attempt failed"
                    );
                    last_error = error;
                }
                AttemptOutcome::Fatal(error) => {
                    tracing::warn!(
                        target: "lectern::webhooks",
                        payload_id = %payload.id,
                        event_id = %event_id,
                        error = %error,
                        "webhook rejected, not retrying"
                    );
                    last_error = error;
                    break;
                }
            }
        }

        let entry = self
            .dlq
            .record_failure(
                event_id,
                event_type,
                &payload,
                &registration.webhook_url,
                &last_error,
            )
            .await?;

        Ok(DeliveryOutcome {
            payload_id: payload.id,
            delivered: false,
            attempts,
            queued_entry_id: Some(entry.id),
        })
    }

    /// Re-deliver an already-built envelope once (used by the retry
    /// worker). Returns the error message on failure.
    pub async fn deliver_once(
        &self,
        registration: &EventFederation,
        payload: &WebhookPayload,
    ) -> Result<(), String> {
        match self.attempt_delivery(registration, payload).await {
            AttemptOutcome::Delivered => Ok(()),
            AttemptOutcome::Retryable(e) | AttemptOutcome::Fatal(e) => Err(e),
        }
    }

    async fn attempt_delivery(
        &self,
        registration: &EventFederation,
        payload: &WebhookPayload,
    ) -> AttemptOutcome {
        let body = match serde_json::to_vec(payload) {
            Ok(b) => b,
            Err(e) => return AttemptOutcome::Fatal(format!("payload serialization failed: {e}")),
        };

        let secret = match crypto::reveal_secret(
            &registration.webhook_secret_encrypted,
            self.encryption_key.as_ref(),
        ) {
            Ok(s) => s,
            Err(e) => return AttemptOutcome::Fatal(format!("secret unavailable: {e}")),
        };

        // Fresh timestamp per attempt so retries stay inside the
        // receiver's replay window.
        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = crypto::compute_hmac_signature(&secret, &timestamp, &body);

        let result = self
            .http
            .post(&registration.webhook_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(WEBHOOK_ID_HEADER, payload.id.to_string())
            .header(WEBHOOK_TIMESTAMP_HEADER, &timestamp)
            .header(WEBHOOK_SIGNATURE_HEADER, format!("sha256={signature}"))
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    AttemptOutcome::Delivered
                } else if status.as_u16() == 429 || status.is_server_error() {
                    AttemptOutcome::Retryable(format!("HTTP {}", status.as_u16()))
                } else {
                    AttemptOutcome::Fatal(format!("HTTP {}", status.as_u16()))
                }
            }
            Err(e) if e.is_timeout() => AttemptOutcome::Retryable("request timeout (10s)".to_string()),
            Err(e) => AttemptOutcome::Retryable(format!("request error: {e}")),
        }
    }

    // -----------------------------------------------------------------
    // Typed senders
    // -----------------------------------------------------------------

    /// Notify the directory of a new submission.
    pub async fn send_submission_created_webhook(
        &self,
        submission: &Submission,
    ) -> WebhookResult<DeliveryOutcome> {
        self.require_federated(submission)?;
        self.send_webhook(
            submission.event_id,
            WebhookEventType::SubmissionCreated,
            serde_json::json!({
                "submissionId": submission.id,
                "title": submission.title,
                "status": submission.status,
            }),
        )
        .await
    }

    /// Notify the directory of a submission status change.
    pub async fn send_status_updated_webhook(
        &self,
        submission: &Submission,
        previous_status: &str,
    ) -> WebhookResult<DeliveryOutcome> {
        self.require_federated(submission)?;
        self.send_webhook(
            submission.event_id,
            WebhookEventType::SubmissionStatusUpdated,
            serde_json::json!({
                "submissionId": submission.id,
                "status": submission.status,
                "previousStatus": previous_status,
            }),
        )
        .await
    }

    /// Notify the directory of an organizer message on a federated
    /// submission thread. Speaker messages originate remotely and are
    /// never echoed back.
    pub async fn send_message_sent_webhook(
        &self,
        message: &FederatedMessage,
        submission: &Submission,
    ) -> WebhookResult<DeliveryOutcome> {
        self.require_federated(submission)?;
        if message.direction != direction::ORGANIZER {
            return Err(WebhookError::Validation(
                "only organizer messages are forwarded".to_string(),
            ));
        }
        self.send_webhook(
            message.event_id,
            WebhookEventType::MessageSent,
            serde_json::json!({
                "messageId": message.id,
                "submissionId": message.submission_id,
                "body": message.body,
                "sentAt": message.sent_at,
            }),
        )
        .await
    }

    /// Notify the directory that a remote message was read locally.
    pub async fn send_message_read_webhook(
        &self,
        message: &FederatedMessage,
    ) -> WebhookResult<DeliveryOutcome> {
        let Some(external_id) = message.external_message_id else {
            return Err(WebhookError::Validation(
                "message has no external id".to_string(),
            ));
        };
        self.send_webhook(
            message.event_id,
            WebhookEventType::MessageRead,
            serde_json::json!({
                "messageId": external_id,
                "readAt": message.read_at,
            }),
        )
        .await
    }

    fn require_federated(&self, submission: &Submission) -> WebhookResult<()> {
        if submission.is_federated {
            Ok(())
        } else {
            Err(WebhookError::Validation(format!(
                "submission {} is not federated",
                submission.id
            )))
        }
    }
}
