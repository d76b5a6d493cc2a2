//! Configuration module for the pinger daemon.
//!
//! Loads process settings from environment variables with sensible defaults.
//! Probe targets live in a separate file, see [`crate::registry`].

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for metrics, health and the alert webhook (default: 8000)
    pub http_port: u16,
    /// Path to the targets file (default: "targets.toml")
    pub targets_file: PathBuf,
    /// Default probe period in seconds (default: 15)
    pub scrape_interval_seconds: f64,
    /// Default probe timeout in seconds (default: 5)
    pub request_timeout_seconds: f64,
    /// Capacity of the alert forwarding queue (default: 256)
    pub alert_queue_capacity: usize,
    /// Where received alerts are forwarded; log-only when unset
    pub alert_forward_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8000,
            targets_file: PathBuf::from("targets.toml"),
            scrape_interval_seconds: 15.0,
            request_timeout_seconds: 5.0,
            alert_queue_capacity: 256,
            alert_forward_url: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PINGER_HTTP_PORT`: HTTP port (default: 8000)
    /// - `TARGETS_FILE`: targets file path (default: "targets.toml")
    /// - `SCRAPE_INTERVAL_SECONDS`: default probe interval (default: 15)
    /// - `REQUEST_TIMEOUT_SECONDS`: default probe timeout (default: 5)
    /// - `ALERT_QUEUE_CAPACITY`: alert forwarding queue size (default: 256)
    /// - `ALERT_FORWARD_URL`: optional URL alerts are POSTed to
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port) = parse_var(&lookup, "PINGER_HTTP_PORT") {
            cfg.http_port = port;
        }

        if let Some(path) = lookup("TARGETS_FILE") {
            cfg.targets_file = PathBuf::from(path);
        }

        if let Some(secs) = parse_var::<f64, _>(&lookup, "SCRAPE_INTERVAL_SECONDS") {
            if secs.is_finite() && secs > 0.0 {
                cfg.scrape_interval_seconds = secs;
            }
        }

        if let Some(secs) = parse_var::<f64, _>(&lookup, "REQUEST_TIMEOUT_SECONDS") {
            if secs.is_finite() && secs > 0.0 {
                cfg.request_timeout_seconds = secs;
            }
        }

        if let Some(capacity) = parse_var::<usize, _>(&lookup, "ALERT_QUEUE_CAPACITY") {
            if capacity > 0 {
                cfg.alert_queue_capacity = capacity;
            }
        }

        cfg.alert_forward_url = lookup("ALERT_FORWARD_URL").filter(|u| !u.trim().is_empty());

        cfg
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring unparseable {}={:?}", key, raw);
            None
        }
    }
}
