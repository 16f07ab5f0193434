//! Lectern Federation
//!
//! Directory federation for a self-hosted Lectern instance: license
//! validation and state caching, consent-token based speaker profile
//! sync with PII encryption at rest, SSRF-guarded material download, and
//! deadline-driven deletion of revoked data.
//!
//! # Modules
//!
//! - [`license`] - Stateless client for the directory licensing API
//! - [`state`] - Cached federation state, feature gating, heartbeats
//! - [`consent`] - Consent-token validation, profile fetch, downloads
//! - [`validation`] - SSRF protection and filename sanitization
//! - [`encryption`] - Field-level AES-256-GCM encryption for PII
//! - [`speakers`] - Speaker repository with transparent encrypt/decrypt
//! - [`sync`] - Profile/material/co-speaker sync orchestration
//! - [`landing`] - Consent landing HTTP endpoint
//! - [`revocation`] - Deadline sweep for revoked speaker data

pub mod consent;
pub mod encryption;
pub mod error;
pub mod landing;
pub mod license;
pub mod revocation;
pub mod speakers;
pub mod state;
pub mod sync;
pub mod validation;

pub use consent::{ConsentClient, SpeakerProfile};
pub use encryption::FieldEncryptor;
pub use error::{ConsentError, ConsentFailure, FederationError, FederationResult};
pub use landing::{consent_router, ConsentLandingState};
pub use license::{LicenseClient, LicenseInfo};
pub use revocation::{sweep_router, RevocationSweeper, SweepRouterState};
pub use speakers::FederatedSpeakerRepository;
pub use state::{FederationService, FederationState};
pub use sync::{SpeakerSyncService, SyncOptions, SyncOutcome};
