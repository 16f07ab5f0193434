//! End-to-end outbound delivery against a mock directory endpoint.

use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lectern_db::{EventFederationStore, MemoryEventFederationStore, MemoryWebhookQueueStore, WebhookQueueStore};
use lectern_webhooks::{
    crypto, DlqService, WebhookEventType, WebhookSender, WEBHOOK_ID_HEADER,
    WEBHOOK_SIGNATURE_HEADER, WEBHOOK_TIMESTAMP_HEADER,
};

const SECRET: &str = "whsec_test_secret";

struct Harness {
    sender: WebhookSender,
    queue: Arc<MemoryWebhookQueueStore>,
    event_id: Uuid,
}

async fn harness(webhook_url: &str) -> Harness {
    let events: Arc<MemoryEventFederationStore> = Arc::new(MemoryEventFederationStore::new());
    let event_id = Uuid::new_v4();
    events
        .create(event_id, Uuid::new_v4(), webhook_url, SECRET)
        .await
        .unwrap();

    let queue = Arc::new(MemoryWebhookQueueStore::new());
    let dlq = DlqService::new(queue.clone());
    let sender = WebhookSender::new(events, dlq, None).unwrap();
    Harness {
        sender,
        queue,
        event_id,
    }
}

#[tokio::test]
async fn delivered_request_is_signed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&format!("{}/hook", server.uri())).await;
    let outcome = h
        .sender
        .send_webhook(
            h.event_id,
            WebhookEventType::SubmissionCreated,
            serde_json::json!({"submissionId": Uuid::new_v4(), "title": "Talk"}),
        )
        .await
        .unwrap();

    assert!(outcome.delivered);
    assert_eq!(outcome.attempts, 1);
    assert!(outcome.queued_entry_id.is_none());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    let id = request.headers.get(WEBHOOK_ID_HEADER).unwrap().to_str().unwrap();
    assert_eq!(id, outcome.payload_id.to_string());

    let timestamp = request
        .headers
        .get(WEBHOOK_TIMESTAMP_HEADER)
        .unwrap()
        .to_str()
        .unwrap();
    let signature = request
        .headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .unwrap()
        .to_str()
        .unwrap();
    let hex = signature.strip_prefix("sha256=").expect("sha256= prefix");
    assert!(crypto::verify_hmac_signature(hex, SECRET, timestamp, &request.body));

    let envelope: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(envelope["type"], "submission.created");
    assert_eq!(envelope["data"]["title"], "Talk");
}

#[tokio::test]
async fn client_error_fails_fast_and_queues() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(410))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri()).await;
    let outcome = h
        .sender
        .send_webhook(
            h.event_id,
            WebhookEventType::MessageSent,
            serde_json::json!({"body": "hi"}),
        )
        .await
        .unwrap();

    // No retries on a non-429 client error, but the payload is still queued.
    assert!(!outcome.delivered);
    assert_eq!(outcome.attempts, 1);
    let entry_id = outcome.queued_entry_id.unwrap();
    let entry = h.queue.find(entry_id).await.unwrap().unwrap();
    assert_eq!(entry.status, "pending_retry");
    assert_eq!(entry.last_error.as_deref(), Some("HTTP 410"));
}

#[tokio::test]
async fn server_errors_retry_then_succeed() {
    let server = MockServer::start().await;
    // Two failures, then success.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let h = harness(&server.uri()).await;
    let outcome = h
        .sender
        .send_webhook(
            h.event_id,
            WebhookEventType::SubmissionStatusUpdated,
            serde_json::json!({"status": "accepted"}),
        )
        .await
        .unwrap();

    assert!(outcome.delivered);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn exhausted_retries_land_in_queue() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let h = harness(&server.uri()).await;
    let outcome = h
        .sender
        .send_webhook(
            h.event_id,
            WebhookEventType::SubmissionCreated,
            serde_json::json!({}),
        )
        .await
        .unwrap();

    assert!(!outcome.delivered);
    assert_eq!(outcome.attempts, 4);

    let entry = h
        .queue
        .find(outcome.queued_entry_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.attempt, 1);
    assert_eq!(entry.status, "pending_retry");
    assert_eq!(entry.last_error.as_deref(), Some("HTTP 500"));
    assert!(entry.next_retry_at.unwrap() > chrono::Utc::now());

    // The queued payload replays verbatim.
    let stored: serde_json::Value = entry.payload.clone();
    assert_eq!(stored["id"], outcome.payload_id.to_string());
}
