//! CMS revalidation webhook.
//!
//! The CMS posts a small JSON event whenever an entry changes. Entry events
//! trigger a full reload from the configured record source; if the content
//! actually changed the dataset version is bumped and every cached response
//! built from an older version is dropped.
//!
//! Security considerations:
//! - A shared bearer token is required when one is configured
//! - Payload size limits prevent memory exhaustion

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::ReplaceOutcome;
use crate::data_sources::DataSourceError;
use crate::AppState;

/// Configuration for webhook ingestion.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Maximum payload size in bytes.
    pub max_payload_size: usize,
    /// Expected `Authorization: Bearer` token, if any.
    pub secret: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 1024 * 1024, // 1 MB
            secret: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CmsEvent {
    pub event: String,
    #[serde(default)]
    pub model: Option<String>,
}

impl CmsEvent {
    /// Entry lifecycle events change the published record set; media and
    /// schema events do not.
    pub fn triggers_reload(&self) -> bool {
        matches!(
            self.event.trim(),
            "entry.publish" | "entry.unpublish" | "entry.update" | "entry.delete" | "entry.create"
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub event: String,
    pub reloaded: bool,
    pub changed: bool,
    pub version: u64,
}

pub fn check_auth(config: &WebhookConfig, headers: &HeaderMap) -> bool {
    let Some(expected) = config.secret.as_deref() else {
        return true;
    };

    let provided = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    provided == Some(expected)
}

pub fn parse_event(config: &WebhookConfig, body: &[u8]) -> Result<CmsEvent, WebhookError> {
    if body.len() > config.max_payload_size {
        return Err(WebhookError::PayloadTooLarge);
    }
    let event: CmsEvent =
        serde_json::from_slice(body).map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
    if event.event.trim().is_empty() {
        return Err(WebhookError::InvalidPayload(
            "Missing 'event' field".to_string(),
        ));
    }
    Ok(event)
}

/// Load the full record set from the source and swap it in. Concurrent
/// reloads are serialised.
pub async fn reload(state: &AppState) -> Result<ReplaceOutcome, DataSourceError> {
    let _guard = state.reload_lock.lock().await;

    let records = state.source.load().await?;
    let count = records.len();
    let outcome = state.dataset.replace(records);

    match outcome {
        ReplaceOutcome::Replaced { previous, version } => {
            let (dropped, cached) = {
                let mut cache = state.cache.lock();
                (cache.invalidate_before(version), cache.len())
            };
            info!(
                source = state.source.name(),
                records = count,
                previous,
                version,
                dropped,
                cached,
                "dataset reloaded"
            );
        }
        ReplaceOutcome::Unchanged { version } => {
            debug!(source = state.source.name(), version, "dataset unchanged");
        }
    }
    Ok(outcome)
}

pub async fn cms_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookError> {
    if !check_auth(&state.config.webhook, &headers) {
        return Err(WebhookError::Unauthorized);
    }
    let event = parse_event(&state.config.webhook, &body)?;

    if !event.triggers_reload() {
        debug!(event = %event.event, model = ?event.model, "ignoring CMS event");
        return Ok(Json(WebhookAck {
            event: event.event,
            reloaded: false,
            changed: false,
            version: state.dataset.snapshot().version,
        }));
    }

    let outcome = reload(&state)
        .await
        .map_err(|e| WebhookError::Upstream(e.to_string()))?;
    let (changed, version) = match outcome {
        ReplaceOutcome::Replaced { version, .. } => (true, version),
        ReplaceOutcome::Unchanged { version } => (false, version),
    };

    Ok(Json(WebhookAck {
        event: event.event,
        reloaded: true,
        changed,
        version,
    }))
}

/// Webhook processing errors.
#[derive(Debug)]
pub enum WebhookError {
    Unauthorized,
    PayloadTooLarge,
    InvalidPayload(String),
    Upstream(String),
}

impl std::fmt::Display for WebhookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "Unauthorized"),
            Self::PayloadTooLarge => write!(f, "Payload too large"),
            Self::InvalidPayload(msg) => write!(f, "Invalid payload: {msg}"),
            Self::Upstream(msg) => write!(f, "Reload failed: {msg}"),
        }
    }
}

impl std::error::Error for WebhookError {}

impl IntoResponse for WebhookError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            Self::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large"),
            Self::InvalidPayload(_) => (StatusCode::BAD_REQUEST, "Invalid payload"),
            Self::Upstream(msg) => {
                tracing::warn!("webhook reload failed: {msg}");
                (StatusCode::BAD_GATEWAY, "Reload failed")
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
