//! HTTP surface for webhooks.
//!
//! - `POST /federation/webhooks/incoming` — signed inbound deliveries
//! - dead-letter queue administration under `/federation/webhooks/queue`
//! - `POST /federation/webhooks/cleanup` — retention purge, guarded by the
//!   cron secret so only the scheduler can trigger it

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::dlq::DlqService;
use crate::error::{WebhookError, WebhookResult};
use crate::receiver::WebhookReceiver;
use crate::worker::RetryWorker;

/// Header carrying the scheduler secret for maintenance routes.
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

/// Shared state for the webhook routes.
#[derive(Clone)]
pub struct WebhookRouterState {
    pub receiver: WebhookReceiver,
    pub dlq: DlqService,
    pub worker: RetryWorker,
    /// Required for the tick and cleanup routes; when unset they always 401.
    pub cron_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    limit: Option<i64>,
}

impl ListParams {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
    }
}

/// Build the webhook router.
pub fn webhook_router(state: WebhookRouterState) -> Router {
    Router::new()
        .route("/federation/webhooks/incoming", post(receive_webhook))
        .route("/federation/webhooks/queue", get(list_dead_letters))
        .route("/federation/webhooks/queue/stats", get(queue_stats))
        .route("/federation/webhooks/queue/:id/retry", post(retry_entry))
        .route("/federation/webhooks/queue/:id", delete(delete_entry))
        .route("/federation/webhooks/queue/tick", post(queue_tick))
        .route("/federation/webhooks/cleanup", post(cleanup))
        .with_state(state)
}

/// Verify and apply an inbound delivery. The raw body is needed for
/// signature verification, so JSON parsing happens after the check.
async fn receive_webhook(
    State(state): State<WebhookRouterState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookError> {
    let (payload, registration) = state
        .receiver
        .verify_incoming_webhook(&headers, &body, None)
        .await?;
    let ack = state.receiver.dispatch(&payload, &registration).await?;
    Ok((StatusCode::OK, Json(ack)).into_response())
}

async fn list_dead_letters(
    State(state): State<WebhookRouterState>,
    Query(params): Query<ListParams>,
) -> Result<Response, WebhookError> {
    let entries = state.dlq.get_dead_letter_webhooks(params.limit()).await?;
    Ok(Json(serde_json::json!({ "entries": entries })).into_response())
}

async fn queue_stats(State(state): State<WebhookRouterState>) -> Result<Response, WebhookError> {
    let stats = state.dlq.get_queue_stats().await?;
    Ok(Json(stats).into_response())
}

async fn retry_entry(
    State(state): State<WebhookRouterState>,
    Path(id): Path<Uuid>,
) -> Result<Response, WebhookError> {
    let entry = state.dlq.retry_dead_letter_webhook(id).await?;
    Ok(Json(entry).into_response())
}

async fn delete_entry(
    State(state): State<WebhookRouterState>,
    Path(id): Path<Uuid>,
) -> Result<Response, WebhookError> {
    state.dlq.delete_webhook(id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Drain due queue entries once. Scheduler-only; complements the
/// in-process worker for deployments that drive retries via cron.
async fn queue_tick(
    State(state): State<WebhookRouterState>,
    headers: HeaderMap,
) -> Result<Response, WebhookError> {
    require_cron_secret(&headers, state.cron_secret.as_deref())?;
    let summary = state.worker.poll_once().await?;
    Ok(Json(summary).into_response())
}

/// Purge terminal queue entries past retention. Scheduler-only.
async fn cleanup(
    State(state): State<WebhookRouterState>,
    headers: HeaderMap,
) -> Result<Response, WebhookError> {
    require_cron_secret(&headers, state.cron_secret.as_deref())?;
    let removed = state.dlq.cleanup_old_webhooks().await?;
    Ok(Json(serde_json::json!({ "removed": removed })).into_response())
}

fn require_cron_secret(headers: &HeaderMap, expected: Option<&str>) -> WebhookResult<()> {
    let Some(expected) = expected else {
        return Err(WebhookError::MissingHeader(CRON_SECRET_HEADER));
    };
    let provided = headers
        .get(CRON_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingHeader(CRON_SECRET_HEADER))?;

    use subtle::ConstantTimeEq;
    if provided.as_bytes().ct_eq(expected.as_bytes()).into() {
        Ok(())
    } else {
        Err(WebhookError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cron_secret_matches() {
        let mut headers = HeaderMap::new();
        headers.insert(CRON_SECRET_HEADER, "s3cret".parse().unwrap());
        assert!(require_cron_secret(&headers, Some("s3cret")).is_ok());
    }

    #[test]
    fn test_cron_secret_mismatch_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(CRON_SECRET_HEADER, "wrong".parse().unwrap());
        assert!(require_cron_secret(&headers, Some("s3cret")).is_err());
    }

    #[test]
    fn test_cron_secret_required() {
        assert!(matches!(
            require_cron_secret(&HeaderMap::new(), Some("s3cret")),
            Err(WebhookError::MissingHeader(_))
        ));
        // Unset secret disables the route entirely.
        let mut headers = HeaderMap::new();
        headers.insert(CRON_SECRET_HEADER, "anything".parse().unwrap());
        assert!(require_cron_secret(&headers, None).is_err());
    }

    #[test]
    fn test_list_limit_clamped() {
        assert_eq!(ListParams { limit: None }.limit(), DEFAULT_LIST_LIMIT);
        assert_eq!(ListParams { limit: Some(0) }.limit(), 1);
        assert_eq!(ListParams { limit: Some(10_000) }.limit(), MAX_LIST_LIMIT);
    }
}
