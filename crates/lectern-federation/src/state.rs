//! Federation state service.
//!
//! Owns the cached view of license validity. The service is constructed
//! once at startup and injected wherever federation state is needed; there
//! is no process-global singleton. A snapshot is served from the cache for
//! up to a TTL; validation failures fall back to the last persisted state
//! with a shortened cache window and an appended warning.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use lectern_core::FederationConfig;
use lectern_db::models::{FederatedSpeaker, FederationSettings, Submission};

use crate::error::{FederationError, FederationResult};
use crate::license::{HeartbeatStats, LicenseClient, LicenseInfo};

/// Cache TTL in production.
const TTL_PRODUCTION: Duration = Duration::from_secs(3600);

/// Cache TTL in development.
const TTL_DEVELOPMENT: Duration = Duration::from_secs(60);

/// Shortened TTL after a validation failure, so recovery is picked up
/// quickly.
const TTL_AFTER_ERROR: Duration = Duration::from_secs(60);

/// Derived federation state served to callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FederationState {
    /// Administratively enabled.
    pub is_enabled: bool,
    /// A license key is present in the configuration.
    pub is_configured: bool,
    /// The license validated successfully (possibly from a persisted
    /// snapshot if the directory is unreachable).
    pub is_valid: bool,
    pub license: Option<LicenseInfo>,
    pub warnings: Vec<String>,
    pub last_validated: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl FederationState {
    fn unconfigured() -> Self {
        Self {
            is_enabled: false,
            is_configured: false,
            is_valid: false,
            license: None,
            warnings: Vec::new(),
            last_validated: None,
            last_heartbeat: None,
        }
    }
}

/// Outcome of a heartbeat, surfaced to the admin UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResult {
    pub success: bool,
    pub warnings: Vec<String>,
    pub update_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct CachedState {
    state: FederationState,
    fetched_at: Instant,
    ttl: Duration,
}

impl CachedState {
    fn is_expired(&self) -> bool {
        self.fetched_at.elapsed() >= self.ttl
    }
}

/// Injected federation state service.
#[derive(Clone)]
pub struct FederationService {
    config: FederationConfig,
    pool: PgPool,
    cache: Arc<RwLock<Option<CachedState>>>,
}

impl FederationService {
    pub fn new(config: FederationConfig, pool: PgPool) -> Self {
        Self {
            config,
            pool,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Current federation state, served from cache unless expired or
    /// `force_refresh` is set.
    ///
    /// Unconfigured instances short-circuit without any network call.
    pub async fn get_state(&self, force_refresh: bool) -> FederationResult<FederationState> {
        if !self.config.is_configured() {
            return Ok(FederationState::unconfigured());
        }

        if !force_refresh {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if !cached.is_expired() {
                    return Ok(cached.state.clone());
                }
            }
        }

        self.refresh().await
    }

    /// Drop the cached snapshot so the next read revalidates.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// Whether federation is enabled, configured, and holding a valid
    /// license.
    pub async fn is_active(&self) -> bool {
        matches!(
            self.get_state(false).await,
            Ok(state) if state.is_enabled && state.is_valid
        )
    }

    /// Whether a named license feature is available.
    ///
    /// True only when federation is active and the license grants the
    /// feature.
    pub async fn has_feature(&self, name: &str) -> bool {
        match self.get_state(false).await {
            Ok(state) => {
                state.is_enabled
                    && state.is_valid
                    && state
                        .license
                        .as_ref()
                        .is_some_and(|l| l.features.get(name).copied().unwrap_or(false))
            }
            Err(_) => false,
        }
    }

    /// Enable or disable federation and invalidate the cache.
    pub async fn set_enabled(&self, enabled: bool) -> FederationResult<()> {
        FederationSettings::set_enabled(&self.pool, enabled).await?;
        self.invalidate().await;
        tracing::info!(target: "lectern::federation", enabled, "federation toggled");
        Ok(())
    }

    /// Gather instance counters, post a heartbeat, and update both the
    /// persisted row and the cached snapshot.
    pub async fn perform_heartbeat(&self) -> FederationResult<HeartbeatResult> {
        let state = self.get_state(false).await?;
        if !state.is_configured || !state.is_enabled {
            return Ok(HeartbeatResult {
                success: false,
                warnings: state.warnings,
                update_available: false,
                error: Some("federation is not enabled".to_string()),
            });
        }

        let client = LicenseClient::new(&self.config)?;
        let stats = HeartbeatStats {
            event_count: Submission::count_events(&self.pool).await?,
            submission_count: Submission::count(&self.pool).await?,
            speaker_count: FederatedSpeaker::count(&self.pool).await?,
        };

        let outcome = match client.send_heartbeat(&stats).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(target: "lectern::federation", error = %e, "heartbeat failed");
                return Ok(HeartbeatResult {
                    success: false,
                    warnings: state.warnings,
                    update_available: false,
                    error: Some(e.to_string()),
                });
            }
        };

        let warnings_json = serde_json::to_value(&outcome.warnings)
            .unwrap_or_else(|_| serde_json::Value::Array(Vec::new()));
        let settings = FederationSettings::record_heartbeat(&self.pool, &warnings_json).await?;

        {
            let mut cache = self.cache.write().await;
            if let Some(cached) = cache.as_mut() {
                cached.state.last_heartbeat = settings.last_heartbeat;
                cached.state.warnings = outcome.warnings.clone();
            }
        }

        Ok(HeartbeatResult {
            success: outcome.success,
            warnings: outcome.warnings,
            update_available: outcome.update_available,
            error: None,
        })
    }

    /// Validate against the directory and rebuild the cached state.
    async fn refresh(&self) -> FederationResult<FederationState> {
        let settings = FederationSettings::get_or_default(&self.pool).await?;
        let client = LicenseClient::new(&self.config)?;

        let (state, ttl) = match client.validate_license().await {
            Ok(outcome) if outcome.valid => {
                let license_json = serde_json::to_value(&outcome.license)
                    .map_err(|e| FederationError::InvalidResponse(e.to_string()))?;
                let warnings_json = serde_json::to_value(&outcome.warnings)
                    .unwrap_or_else(|_| serde_json::Value::Array(Vec::new()));
                let features_json = outcome
                    .license
                    .as_ref()
                    .and_then(|l| serde_json::to_value(&l.features).ok())
                    .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));

                let settings = FederationSettings::save_snapshot(
                    &self.pool,
                    &license_json,
                    &warnings_json,
                    &features_json,
                )
                .await?;

                let state = FederationState {
                    is_enabled: settings.enabled,
                    is_configured: true,
                    is_valid: true,
                    license: outcome.license,
                    warnings: outcome.warnings,
                    last_validated: settings.last_validated,
                    last_heartbeat: settings.last_heartbeat,
                };
                (state, self.base_ttl())
            }
            Ok(outcome) => {
                // Expected rejection: the license itself is bad.
                let mut warnings = outcome.warnings;
                if let Some(error) = outcome.error {
                    warnings.push(format!("License validation failed: {error}"));
                }
                let state = FederationState {
                    is_enabled: settings.enabled,
                    is_configured: true,
                    is_valid: false,
                    license: None,
                    warnings,
                    last_validated: settings.last_validated,
                    last_heartbeat: settings.last_heartbeat,
                };
                (state, self.base_ttl())
            }
            Err(e) => {
                // Directory unreachable: fall back to the persisted
                // snapshot with a shortened window.
                tracing::warn!(
                    target: "lectern::federation",
                    error = %e,
                    "license validation unreachable, using persisted state"
                );
                let license: Option<LicenseInfo> = settings
                    .license_snapshot
                    .clone()
                    .and_then(|v| serde_json::from_value(v).ok());
                let mut warnings = settings.warning_list();
                warnings.push(format!("License validation error: {e}"));

                let state = FederationState {
                    is_enabled: settings.enabled,
                    is_configured: true,
                    is_valid: license.is_some(),
                    license,
                    warnings,
                    last_validated: settings.last_validated,
                    last_heartbeat: settings.last_heartbeat,
                };
                (state, TTL_AFTER_ERROR)
            }
        };

        *self.cache.write().await = Some(CachedState {
            state: state.clone(),
            fetched_at: Instant::now(),
            ttl,
        });

        Ok(state)
    }

    fn base_ttl(&self) -> Duration {
        if self.config.development {
            TTL_DEVELOPMENT
        } else {
            TTL_PRODUCTION
        }
    }
}
