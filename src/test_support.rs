//! Helpers shared by unit tests.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use parking_lot::Mutex;
use url::Url;

use crate::alert::{AlertEvent, AlertSink, DispatchError};
use crate::registry::{Endpoint, HttpMethod, Target};

pub fn tcp_target(name: &str, port: u16, threshold_seconds: f64) -> Target {
    Target {
        name: name.to_string(),
        uri: format!("tcp://127.0.0.1:{}", port),
        endpoint: Endpoint::Tcp {
            host: "127.0.0.1".to_string(),
            port,
        },
        threshold_seconds,
        interval: Duration::from_secs(15),
        timeout: Duration::from_secs(5),
    }
}

pub fn http_target(name: &str, url: &str, threshold_seconds: f64) -> Target {
    Target {
        name: name.to_string(),
        uri: url.to_string(),
        endpoint: Endpoint::Http {
            url: Url::parse(url).expect("test url"),
            method: HttpMethod::Get,
        },
        threshold_seconds,
        interval: Duration::from_secs(15),
        timeout: Duration::from_secs(5),
    }
}

pub fn with_timing(mut target: Target, interval_seconds: f64, timeout_seconds: f64) -> Target {
    target.interval = Duration::from_secs_f64(interval_seconds);
    target.timeout = Duration::from_secs_f64(timeout_seconds);
    target
}

/// Serve `router` on an ephemeral loopback port.
pub async fn spawn_http(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Sink that keeps every delivered event.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AlertEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<AlertEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, event: &AlertEvent) -> Result<(), DispatchError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// In-memory sink for formatted log output.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Route this thread's log events into the capture until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
