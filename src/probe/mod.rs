//! Probe module for endpoint monitoring.
//!
//! Supports HTTP(S) requests and TCP connect handshakes. The endpoint kind is
//! fixed when the target is loaded, so dispatch is a plain match on
//! [`Endpoint`].

mod http;
mod tcp;

pub use http::*;
pub use tcp::*;

use crate::registry::{Endpoint, Target};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Classified probe failure. Never escapes a probe cycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection refused")]
    ConnectionRefused,
    #[error("DNS resolution failed: {0}")]
    Dns(String),
    #[error("TLS error: {0}")]
    Tls(String),
    /// Server error response. The latency is still reported for diagnostics.
    #[error("HTTP status {status}")]
    HttpStatus { status: u16, latency: Duration },
    #[error("network error: {0}")]
    Network(String),
}

impl ProbeError {
    /// Stable short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Timeout(_) => "timeout",
            ProbeError::ConnectionRefused => "connection_refused",
            ProbeError::Dns(_) => "dns",
            ProbeError::Tls(_) => "tls",
            ProbeError::HttpStatus { .. } => "http_status",
            ProbeError::Network(_) => "network",
        }
    }
}

/// Outcome of a single probe attempt.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// The target snapshot the probe ran against.
    pub target: Arc<Target>,
    /// When the attempt started.
    pub time: DateTime<Utc>,
    /// Observed latency. Set on success and on HTTP 5xx, `None` otherwise.
    pub latency: Option<Duration>,
    pub error: Option<ProbeError>,
}

impl ProbeResult {
    pub fn new(target: Arc<Target>, time: DateTime<Utc>, outcome: Result<Duration, ProbeError>) -> Self {
        match outcome {
            Ok(latency) => Self {
                target,
                time,
                latency: Some(latency),
                error: None,
            },
            Err(err) => {
                let latency = match &err {
                    ProbeError::HttpStatus { latency, .. } => Some(*latency),
                    _ => None,
                };
                Self {
                    target,
                    time,
                    latency,
                    error: Some(err),
                }
            }
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub fn latency_seconds(&self) -> Option<f64> {
        self.latency.map(|d| d.as_secs_f64())
    }
}

/// Runs probes for any target kind. Cheap to clone; the HTTP client is shared.
#[derive(Clone)]
pub struct Prober {
    http: HttpProber,
}

impl Prober {
    pub fn new() -> Result<Self, ProbeError> {
        Ok(Self {
            http: HttpProber::new()?,
        })
    }

    /// Probe `target`, never taking longer than `timeout`.
    ///
    /// Every failure is folded into the returned [`ProbeResult`].
    pub async fn probe(&self, target: Arc<Target>, timeout: Duration) -> ProbeResult {
        let time = Utc::now();

        let outcome = match tokio::time::timeout(timeout, self.measure(&target, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(timeout)),
        };

        ProbeResult::new(target, time, outcome)
    }

    async fn measure(&self, target: &Target, timeout: Duration) -> Result<Duration, ProbeError> {
        match &target.endpoint {
            Endpoint::Http { url, method } => self.http.measure(url, *method, timeout).await,
            Endpoint::Tcp { host, port } => run_tcp_probe(host, *port).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{http_target, spawn_http, tcp_target};
    use axum::{routing::get, Router};
    use std::time::Instant;

    #[test]
    fn test_http_5xx_keeps_latency() {
        let target = Arc::new(tcp_target("t", 1, 1.0));
        let result = ProbeResult::new(
            target.clone(),
            Utc::now(),
            Err(ProbeError::HttpStatus {
                status: 503,
                latency: Duration::from_millis(20),
            }),
        );
        assert!(!result.success());
        assert_eq!(result.latency, Some(Duration::from_millis(20)));

        let result = ProbeResult::new(target, Utc::now(), Err(ProbeError::ConnectionRefused));
        assert!(!result.success());
        assert!(result.latency.is_none());
    }

    #[tokio::test]
    async fn test_probe_enforces_timeout() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let addr = spawn_http(router).await;
        let target = Arc::new(http_target("slow", &format!("http://{}/slow", addr), 1.0));

        let prober = Prober::new().unwrap();
        let timeout = Duration::from_millis(200);
        let start = Instant::now();
        let result = prober.probe(target, timeout).await;

        assert!(start.elapsed() < timeout + Duration::from_millis(500));
        assert!(!result.success());
        assert_eq!(result.error, Some(ProbeError::Timeout(timeout)));
    }

    #[tokio::test]
    async fn test_probe_dispatches_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let target = Arc::new(tcp_target("tcp", port, 1.0));

        let prober = Prober::new().unwrap();
        let result = prober.probe(target.clone(), Duration::from_secs(2)).await;
        assert!(result.success(), "unexpected error: {:?}", result.error);
        assert!(result.latency.is_some());
        assert_eq!(result.target.name, "tcp");
    }
}
