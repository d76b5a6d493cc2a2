//! Alert webhook payloads.
//!
//! Accepts the Alertmanager webhook schema, validates each alert, and turns it
//! into an [`AlertEvent`] for logging and forwarding.

mod dispatch;

pub use dispatch::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Why an inbound webhook body was rejected.
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("alert {index}: missing status")]
    MissingStatus { index: usize },
    #[error("alert {index}: unknown status {status:?}")]
    InvalidStatus { index: usize, status: String },
    #[error("alert {index}: missing labels")]
    MissingLabels { index: usize },
}

/// Alertmanager webhook envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub alerts: Vec<RawAlert>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub group_key: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub receiver: Option<String>,
    #[serde(default)]
    pub group_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub common_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub common_annotations: BTreeMap<String, String>,
    #[serde(default, rename = "externalURL")]
    pub external_url: Option<String>,
}

/// One alert as sent by the alerting engine, before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAlert {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "generatorURL")]
    pub generator_url: Option<String>,
    #[serde(default)]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertStatus::Firing => f.write_str("firing"),
            AlertStatus::Resolved => f.write_str("resolved"),
        }
    }
}

/// A validated alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub name: String,
    pub status: AlertStatus,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl AlertEvent {
    /// The probed target this alert is about, if labelled.
    pub fn target(&self) -> Option<&str> {
        self.labels
            .get("target")
            .or_else(|| self.labels.get("name"))
            .map(String::as_str)
    }

    /// Emit the structured "alert received" log line.
    pub fn log(&self) {
        tracing::info!(
            alertname = %self.name,
            status = %self.status,
            "target" = %self.target().unwrap_or("-"),
            starts_at = %self
                .starts_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
            "alert received"
        );
    }
}

impl TryFrom<(usize, RawAlert)> for AlertEvent {
    type Error = WebhookError;

    fn try_from((index, raw): (usize, RawAlert)) -> Result<Self, Self::Error> {
        let status = match raw.status.trim() {
            "" => return Err(WebhookError::MissingStatus { index }),
            "firing" => AlertStatus::Firing,
            "resolved" => AlertStatus::Resolved,
            other => {
                return Err(WebhookError::InvalidStatus {
                    index,
                    status: other.to_string(),
                })
            }
        };

        if raw.labels.is_empty() {
            return Err(WebhookError::MissingLabels { index });
        }

        let name = raw
            .labels
            .get("alertname")
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Self {
            name,
            status,
            labels: raw.labels,
            annotations: raw.annotations,
            starts_at: raw.starts_at,
            ends_at: raw.ends_at,
            generator_url: raw.generator_url,
            fingerprint: raw.fingerprint,
        })
    }
}

/// Parse and validate a webhook body. Any invalid alert rejects the whole body.
pub fn parse_alerts(body: &[u8]) -> Result<Vec<AlertEvent>, WebhookError> {
    let payload: WebhookPayload = serde_json::from_slice(body)?;
    tracing::debug!(
        version = ?payload.version,
        receiver = ?payload.receiver,
        status = ?payload.status,
        group_key = ?payload.group_key,
        external_url = ?payload.external_url,
        group_labels = ?payload.group_labels,
        common_labels = ?payload.common_labels,
        common_annotations = payload.common_annotations.len(),
        "alert group with {} alerts",
        payload.alerts.len()
    );
    payload
        .alerts
        .into_iter()
        .enumerate()
        .map(AlertEvent::try_from)
        .collect()
}
