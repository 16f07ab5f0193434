//! Database layer for the Lectern federation subsystem.
//!
//! Provides sqlx/Postgres models for the federation tables, embedded
//! migrations, and the repository-trait seam ([`store`]) behind which the
//! services run. Every trait has a durable Postgres implementation and an
//! in-memory implementation; the in-memory variants back tests and serve as
//! the webhook queue's explicitly non-durable fallback.

pub mod migrations;
pub mod models;
pub mod store;

pub use migrations::MIGRATOR;
pub use store::{
    EventFederationStore, MemoryEventFederationStore, MemoryMessageStore, MemorySpeakerStore,
    MemoryWebhookQueueStore, MessageStore, PgEventFederationStore, PgMessageStore, PgSpeakerStore,
    PgWebhookQueueStore, SpeakerStore, StoreError, WebhookQueueStore,
};
