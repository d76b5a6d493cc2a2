//! HTTP probe implementation.

use std::error::Error as StdError;
use std::time::{Duration, Instant};

use url::Url;

use super::ProbeError;
use crate::registry::HttpMethod;

/// Issues GET/HEAD requests with a shared client.
#[derive(Clone)]
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Result<Self, ProbeError> {
        // Probes measure the direct path, so environment proxies are ignored.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(concat!("pinger/", env!("CARGO_PKG_VERSION")))
            .no_proxy()
            .build()
            .map_err(|e| ProbeError::Network(e.to_string()))?;

        Ok(Self { client })
    }

    /// Request `url` and return the time until the body was fully read.
    ///
    /// Redirects are followed. Any status below 500 counts as success.
    pub async fn measure(
        &self,
        url: &Url,
        method: HttpMethod,
        timeout: Duration,
    ) -> Result<Duration, ProbeError> {
        let request = match method {
            HttpMethod::Get => self.client.get(url.clone()),
            HttpMethod::Head => self.client.head(url.clone()),
        };

        let start = Instant::now();

        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_error(&e, timeout))?;

        let status = response.status();

        // Read the full body to measure complete transfer time
        let _body = response
            .bytes()
            .await
            .map_err(|e| classify_error(&e, timeout))?;

        let elapsed = start.elapsed();

        if status.is_server_error() {
            return Err(ProbeError::HttpStatus {
                status: status.as_u16(),
                latency: elapsed,
            });
        }

        Ok(elapsed)
    }
}

/// Map a reqwest error onto the probe error classes by walking its source chain.
///
/// The top-level message embeds the request URL, so only the causes are
/// matched against text. I/O error kinds are checked across the whole chain
/// before any text match.
fn classify_error(err: &reqwest::Error, timeout: Duration) -> ProbeError {
    if err.is_timeout() {
        return ProbeError::Timeout(timeout);
    }

    let causes = || std::iter::successors(err.source(), |e| (*e).source());

    for e in causes() {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => return ProbeError::ConnectionRefused,
                std::io::ErrorKind::TimedOut => return ProbeError::Timeout(timeout),
                _ => {}
            }
        }
    }

    for e in causes() {
        let msg = e.to_string();
        let lower = msg.to_lowercase();
        if lower.contains("dns error") || lower.contains("failed to lookup address") {
            return ProbeError::Dns(msg);
        }
        if lower.contains("certificate") || lower.contains("tls") || lower.contains("ssl") {
            return ProbeError::Tls(msg);
        }
    }

    ProbeError::Network(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_http;
    use axum::{http::StatusCode, response::Redirect, routing::get, Router};

    fn test_router() -> Router {
        Router::new()
            .route("/ok", get(|| async { "hello" }))
            .route("/missing", get(|| async { (StatusCode::NOT_FOUND, "nope") }))
            .route("/broken", get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }))
            .route("/moved", get(|| async { Redirect::temporary("/ok") }))
            .route("/loop", get(|| async { Redirect::temporary("/loop") }))
    }

    async fn measure(path: &str, method: HttpMethod) -> Result<Duration, ProbeError> {
        let addr = spawn_http(test_router()).await;
        let url = Url::parse(&format!("http://{}{}", addr, path)).unwrap();
        HttpProber::new()
            .unwrap()
            .measure(&url, method, Duration::from_secs(2))
            .await
    }

    #[tokio::test]
    async fn test_http_probe_success() {
        let latency = measure("/ok", HttpMethod::Get).await.unwrap();
        assert!(latency < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_http_probe_head() {
        assert!(measure("/ok", HttpMethod::Head).await.is_ok());
    }

    #[tokio::test]
    async fn test_http_probe_4xx_is_up() {
        assert!(measure("/missing", HttpMethod::Get).await.is_ok());
    }

    #[tokio::test]
    async fn test_http_probe_5xx_is_failure_with_latency() {
        match measure("/broken", HttpMethod::Get).await {
            Err(ProbeError::HttpStatus { status, latency }) => {
                assert_eq!(status, 500);
                assert!(latency < Duration::from_secs(2));
            }
            other => panic!("expected HttpStatus error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_probe_follows_redirects() {
        assert!(measure("/moved", HttpMethod::Get).await.is_ok());
    }

    #[tokio::test]
    async fn test_http_probe_redirect_loop_fails() {
        assert!(matches!(
            measure("/loop", HttpMethod::Get).await,
            Err(ProbeError::Network(_))
        ));
    }

    async fn measure_closed_port(path: &str) -> Result<Duration, ProbeError> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("http://{}{}", addr, path)).unwrap();
        HttpProber::new()
            .unwrap()
            .measure(&url, HttpMethod::Get, Duration::from_secs(2))
            .await
    }

    #[tokio::test]
    async fn test_http_probe_connection_refused() {
        assert_eq!(measure_closed_port("/").await, Err(ProbeError::ConnectionRefused));
    }

    #[tokio::test]
    async fn test_http_refused_not_classified_by_url_text() {
        for path in ["/tls-status", "/certificate-check", "/ssl"] {
            assert_eq!(
                measure_closed_port(path).await,
                Err(ProbeError::ConnectionRefused),
                "path {}",
                path
            );
        }
    }

    #[tokio::test]
    async fn test_http_probe_invalid_host() {
        let url = Url::parse("http://nonexistent.invalid/").unwrap();
        let result = HttpProber::new()
            .unwrap()
            .measure(&url, HttpMethod::Get, Duration::from_secs(2))
            .await;
        assert!(matches!(result, Err(ProbeError::Dns(_))), "got {:?}", result);
    }
}
