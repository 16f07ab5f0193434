//! Database models for the federation subsystem.

pub mod event_federation;
pub mod federated_speaker;
pub mod federation_settings;
pub mod message;
pub mod submission;
pub mod webhook_queue;

pub use event_federation::EventFederation;
pub use federated_speaker::{FederatedSpeaker, NewFederatedSpeaker};
pub use federation_settings::FederationSettings;
pub use message::{direction, FederatedMessage, NewFederatedMessage};
pub use submission::Submission;
pub use webhook_queue::{NewWebhookQueueEntry, QueueStats, QueueStatus, WebhookQueueEntry};
