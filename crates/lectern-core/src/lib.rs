//! Lectern Core Library
//!
//! Shared configuration for the Lectern federation subsystem.
//!
//! # Modules
//!
//! - [`config`] - Federation configuration loaded from the environment

pub mod config;

pub use config::{ConfigError, FederationConfig};
