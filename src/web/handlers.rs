//! HTTP request handlers.

use super::AppState;
use crate::alert::{parse_alerts, WebhookError};
use crate::metrics::{render, CONTENT_TYPE};
use crate::registry::ConfigError;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;

// ============================================================================
// Metrics
// ============================================================================

/// Current snapshot in text exposition format. Never waits on probes.
pub async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = render(&state.store.snapshot());
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], body)
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub targets: usize,
    pub alerts_dropped: u64,
}

pub async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        targets: state.registry.current().len(),
        alerts_dropped: state.alerts.dropped(),
    })
}

// ============================================================================
// Alert webhook
// ============================================================================

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "error", "error": self.to_string() })),
        )
            .into_response()
    }
}

/// Accept an alert group. Forwarding happens in the background.
pub async fn handle_alert(State(state): State<AppState>, body: Bytes) -> Response {
    let events = match parse_alerts(&body) {
        Ok(events) => events,
        Err(e) => {
            tracing::warn!("Rejected alert webhook payload: {}", e);
            return e.into_response();
        }
    };

    for event in events {
        event.log();
        state.alerts.submit(event);
    }

    Json(json!({ "status": "ok" })).into_response()
}

// ============================================================================
// Reload
// ============================================================================

impl IntoResponse for ConfigError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "error", "error": self.to_string() })),
        )
            .into_response()
    }
}

pub async fn handle_reload(State(state): State<AppState>) -> Response {
    match state.reload().await {
        Ok(summary) => Json(json!({
            "status": "ok",
            "targets": state.registry.current().len(),
            "added": summary.added,
            "removed": summary.removed,
            "restarted": summary.restarted,
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}
