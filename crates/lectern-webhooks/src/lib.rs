//! Webhook exchange with the federation directory.
//!
//! Outbound deliveries are HMAC-SHA256 signed envelopes with a short
//! inline retry schedule; exhausted deliveries land in a dead-letter queue
//! drained by a background worker with exponential backoff. Inbound
//! deliveries are verified (signature plus replay window) before being
//! dispatched to idempotent handlers.
//!
//! - [`crypto`] — secret generation, secrets at rest, payload signing
//! - [`models`] — wire envelope and event types
//! - [`sender`] — outbound delivery with inline retries
//! - [`receiver`] — inbound verification and dispatch
//! - [`dlq`] — dead-letter queue and backoff schedule
//! - [`worker`] — background redelivery loop
//! - [`router`] — HTTP surface (inbound endpoint, queue admin, cleanup)

pub mod crypto;
pub mod dlq;
pub mod error;
pub mod models;
pub mod receiver;
pub mod router;
pub mod sender;
pub mod worker;

pub use dlq::{DlqService, MAX_DELIVERY_ATTEMPTS};
pub use error::{WebhookError, WebhookResult};
pub use models::{
    WebhookEventType, WebhookPayload, WEBHOOK_ID_HEADER, WEBHOOK_SIGNATURE_HEADER,
    WEBHOOK_TIMESTAMP_HEADER,
};
pub use receiver::{verify_webhook_signature, WebhookReceiver};
pub use router::{webhook_router, WebhookRouterState, CRON_SECRET_HEADER};
pub use sender::{DeliveryOutcome, WebhookSender};
pub use worker::{spawn_retry_worker, PollSummary, RetryWorker};
