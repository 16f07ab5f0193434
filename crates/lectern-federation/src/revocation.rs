//! Deadline-driven deletion of revoked speaker data.
//!
//! Revocation clears consent scopes immediately but leaves the row in
//! place with a deletion deadline; this sweeper removes rows once the
//! deadline passes. The interval is configurable per deployment.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use std::time::Duration;

use crate::error::FederationResult;
use crate::speakers::FederatedSpeakerRepository;

/// Default sweep interval.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Header carrying the scheduler secret on the sweep route.
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// Periodic sweep removing speaker rows past their deletion deadline.
#[derive(Clone)]
pub struct RevocationSweeper {
    repo: FederatedSpeakerRepository,
    interval: Duration,
}

impl RevocationSweeper {
    pub fn new(repo: FederatedSpeakerRepository) -> Self {
        Self {
            repo,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Override the sweep interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run one sweep. Returns the number of rows deleted.
    pub async fn sweep_once(&self) -> FederationResult<u64> {
        let deleted = self.repo.delete_past_deadline(Utc::now()).await?;
        if deleted > 0 {
            tracing::info!(
                target: "lectern::federation",
                deleted,
                "removed revoked speaker rows past deadline"
            );
        }
        Ok(deleted)
    }

    /// Run the sweep on its interval until the task is dropped.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep_once().await {
                tracing::error!(
                    target: "lectern::federation",
                    error = %e,
                    "revocation sweep failed"
                );
            }
        }
    }
}

/// State for the cron-driven sweep route.
#[derive(Clone)]
pub struct SweepRouterState {
    pub sweeper: RevocationSweeper,
    /// Required for the route; when unset the route always 401s.
    pub cron_secret: Option<String>,
}

/// Router exposing `POST /federation/speakers/sweep` for deployments that
/// drive the sweep via an external scheduler instead of the in-process
/// loop.
pub fn sweep_router(state: SweepRouterState) -> Router {
    Router::new()
        .route("/federation/speakers/sweep", post(sweep_handler))
        .with_state(state)
}

async fn sweep_handler(
    State(state): State<SweepRouterState>,
    headers: HeaderMap,
) -> Response {
    if !cron_secret_matches(&headers, state.cron_secret.as_deref()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "unauthorized",
                "message": "missing or invalid cron secret",
                "status": 401,
            })),
        )
            .into_response();
    }

    match state.sweeper.sweep_once().await {
        Ok(removed) => Json(serde_json::json!({ "removed": removed })).into_response(),
        Err(e) => {
            tracing::error!(target: "lectern::federation", error = %e, "sweep failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "internal_error",
                    "message": "Internal server error",
                    "status": 500,
                })),
            )
                .into_response()
        }
    }
}

fn cron_secret_matches(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    let Some(provided) = headers.get(CRON_SECRET_HEADER).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    use subtle::ConstantTimeEq;
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}
