//! Inbound webhook listener.
//!
//! Webhook mode replaces polling with a single HTTP endpoint: the
//! provider POSTs its native JSON payload to `/`, the handler validates
//! the `X-Hub-Signature-256` HMAC against the shared secret, converts
//! push and pull-request payloads to normalized events, and delivers
//! them to the orchestrator channel synchronously within the request.
//! Validation and parse failures are logged and dropped, never retried
//! or escalated; unsupported event types are accepted and ignored.

use crate::convert::{self, PullRequestHook, PushHook};
use crate::watcher::WatchError;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use hmac::{Hmac, Mac};
use review_relay_core::Event;
use sha2::Sha256;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;

/// Shared handler state.
#[derive(Clone)]
pub struct WebhookState {
    secret: Arc<str>,
    events: mpsc::Sender<Event>,
}

impl WebhookState {
    pub fn new(secret: String, events: mpsc::Sender<Event>) -> Self {
        Self {
            secret: secret.into(),
            events,
        }
    }
}

/// Build the webhook router.
pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/", post(handle_delivery))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve the webhook listener until cancellation.
pub async fn serve(
    addr: &str,
    secret: String,
    events: mpsc::Sender<Event>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), WatchError> {
    info!(listen = addr, "starting webhook watcher");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = router(WebhookState::new(secret, events));

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

    Ok(())
}

async fn handle_delivery(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok());

    let Some(signature) = signature else {
        warn!("webhook delivery without signature");
        return StatusCode::UNAUTHORIZED;
    };

    if !verify_signature(&state.secret, &body, signature) {
        warn!("webhook payload could not be validated");
        return StatusCode::UNAUTHORIZED;
    }

    let event_type = headers
        .get("x-github-event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let delivery_id = headers
        .get("x-github-delivery")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let event = match event_type {
        "push" => match serde_json::from_slice::<PushHook>(&body) {
            Ok(hook) => Event::Push(convert::cast_push_hook(&hook, delivery_id)),
            Err(err) => {
                warn!(error = %err, "webhook payload could not be parsed");
                return StatusCode::BAD_REQUEST;
            }
        },
        "pull_request" => match serde_json::from_slice::<PullRequestHook>(&body) {
            Ok(hook) => Event::Review(convert::cast_pull_request_hook(&hook)),
            Err(err) => {
                warn!(error = %err, "webhook payload could not be parsed");
                return StatusCode::BAD_REQUEST;
            }
        },
        other => {
            // accepted but ignored
            debug!(event_type = other, "unsupported webhook event type");
            return StatusCode::OK;
        }
    };

    debug!(
        event_type,
        delivery_id,
        internal_id = event.internal_id(),
        "webhook event received"
    );

    if state.events.send(event).await.is_err() {
        warn!("event channel closed, dropping webhook delivery");
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    StatusCode::OK
}

/// Constant-time HMAC-SHA256 check of `sha256=<hex>` signatures.
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    type HmacSha256 = Hmac<Sha256>;

    let hex_part = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(expected) = hex::decode(hex_part) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
