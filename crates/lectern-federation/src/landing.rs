//! Consent landing endpoint.
//!
//! Speakers arrive here from the directory's consent flow with a token in
//! the query string. The handler validates the parameters, runs a sync,
//! and either redirects back to `return_url` with the outcome appended or
//! answers with JSON when no return URL was given.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use lectern_db::EventFederationStore;

use crate::error::{ConsentError, FederationError};
use crate::sync::{SpeakerSyncService, SyncOptions};

/// Shared state for the consent landing route.
#[derive(Clone)]
pub struct ConsentLandingState {
    pub sync: SpeakerSyncService,
    pub events: Arc<dyn EventFederationStore>,
}

/// Query parameters of the consent landing redirect.
#[derive(Debug, Deserialize)]
pub struct ConsentLandingParams {
    pub token: String,
    /// Directory speaker id.
    pub speaker: Uuid,
    /// Directory event id.
    pub event: Uuid,
    #[serde(default)]
    pub return_url: Option<String>,
}

/// Router exposing `GET /federation/consent`.
pub fn consent_router(state: ConsentLandingState) -> Router {
    Router::new()
        .route("/federation/consent", get(consent_landing))
        .with_state(state)
}

async fn consent_landing(
    State(state): State<ConsentLandingState>,
    Query(params): Query<ConsentLandingParams>,
) -> Response {
    let event_id = match state.events.find_by_federated_event(params.event).await {
        Ok(registration) => registration.map(|r| r.event_id),
        Err(e) => {
            tracing::error!(target: "lectern::federation", error = %e, "event lookup failed");
            return respond(&params, "error", StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let options = SyncOptions {
        consent_token: params.token.clone(),
        speaker_id: params.speaker,
        federated_event_id: params.event,
        event_id,
        download_materials: true,
    };

    match state.sync.sync_federated_speaker(&options).await {
        Ok(_) => respond(&params, "success", StatusCode::OK),
        Err(FederationError::Consent(ConsentError::Validation(failure))) => {
            respond(&params, failure.code(), StatusCode::UNPROCESSABLE_ENTITY)
        }
        Err(e) => {
            tracing::error!(target: "lectern::federation", error = %e, "consent sync failed");
            respond(&params, "error", StatusCode::BAD_GATEWAY)
        }
    }
}

/// Redirect back to the caller with the outcome appended, or answer with
/// JSON when no (valid) return URL was supplied.
fn respond(params: &ConsentLandingParams, status: &str, code: StatusCode) -> Response {
    if let Some(return_url) = params.return_url.as_deref() {
        if let Ok(mut url) = url::Url::parse(return_url) {
            url.query_pairs_mut()
                .append_pair("status", status)
                .append_pair("speaker", &params.speaker.to_string())
                .append_pair("event", &params.event.to_string());
            return Redirect::to(url.as_str()).into_response();
        }
        tracing::warn!(
            target: "lectern::federation",
            return_url,
            "unparsable return_url, answering with JSON"
        );
    }

    (
        code,
        Json(serde_json::json!({
            "status": status,
            "speaker": params.speaker,
            "event": params.event,
        })),
    )
        .into_response()
}
