//! Target model types.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// HTTP method used by HTTP probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "head")]
    Head,
}

/// Where and how a target is probed, resolved from the URI scheme at load time.
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    /// `http://` or `https://` request.
    Http { url: Url, method: HttpMethod },
    /// `tcp://host:port` connect handshake.
    Tcp { host: String, port: u16 },
}

impl Endpoint {
    /// Short protocol label, used in logs.
    pub fn scheme(&self) -> &'static str {
        match self {
            Endpoint::Http { .. } => "http",
            Endpoint::Tcp { .. } => "tcp",
        }
    }
}

/// A probe target. Immutable once loaded; shared as `Arc<Target>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: String,
    /// The URI exactly as configured.
    pub uri: String,
    pub endpoint: Endpoint,
    pub threshold_seconds: f64,
    /// Resolved probe period (per-target override or global default).
    pub interval: Duration,
    /// Resolved probe timeout (per-target override or global default).
    pub timeout: Duration,
}

/// One `[[targets]]` entry as written in the targets file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(alias = "url")]
    pub uri: String,
    pub threshold_seconds: f64,
    #[serde(default)]
    pub interval_seconds: Option<f64>,
    #[serde(default)]
    pub timeout_seconds: Option<f64>,
    #[serde(default)]
    pub method: Option<HttpMethod>,
}

/// The whole targets file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetsFile {
    #[serde(default)]
    pub interval_seconds: Option<f64>,
    #[serde(default)]
    pub request_timeout_seconds: Option<f64>,
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
}
