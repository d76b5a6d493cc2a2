//! Alert forwarding.
//!
//! The webhook handler only enqueues events; a single background worker hands
//! them to the configured [`AlertSink`]. The queue is bounded and rejects new
//! events when full.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use url::Url;

use super::AlertEvent;

/// Forwarding failure. Logged by the dispatcher, never returned to the caller.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("endpoint returned HTTP {0}")]
    Status(u16),
}

/// Destination for received alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, event: &AlertEvent) -> Result<(), DispatchError>;
}

/// Default sink: log only.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, event: &AlertEvent) -> Result<(), DispatchError> {
        tracing::debug!(
            alertname = %event.name,
            status = %event.status,
            "alert dispatched (log only)"
        );
        Ok(())
    }
}

/// POSTs each alert as JSON to a fixed URL.
pub struct WebhookSink {
    client: reqwest::Client,
    url: Url,
}

impl WebhookSink {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, event: &AlertEvent) -> Result<(), DispatchError> {
        let response = self.client.post(self.url.clone()).json(event).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Bounded queue plus the worker draining it.
pub struct AlertDispatcher {
    tx: mpsc::Sender<AlertEvent>,
    dropped: AtomicU64,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AlertDispatcher {
    /// Start the dispatch worker.
    pub fn spawn(sink: Arc<dyn AlertSink>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);

        tracing::info!("Alert dispatcher started (sink={}, capacity={})", sink.name(), capacity);
        let worker = tokio::spawn(run_dispatcher(rx, sink, shutdown_rx));

        Self {
            tx,
            dropped: AtomicU64::new(0),
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue an event without waiting. Returns `false` if it was dropped.
    pub fn submit(&self, event: AlertEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    "Alert queue full, dropping {} ({}); {} dropped so far",
                    event.name,
                    event.status,
                    dropped
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Alert dispatcher stopped, dropping {}", event.name);
                false
            }
        }
    }

    /// Number of events rejected so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting events, deliver what is queued, and wait for the worker.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                tracing::error!("Alert dispatcher worker failed: {}", e);
            }
        }
    }
}

async fn run_dispatcher(
    mut rx: mpsc::Receiver<AlertEvent>,
    sink: Arc<dyn AlertSink>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(event) => deliver(sink.as_ref(), &event).await,
                    None => break,
                }
            }
            _ = shutdown.changed() => {
                rx.close();
                while let Some(event) = rx.recv().await {
                    deliver(sink.as_ref(), &event).await;
                }
                break;
            }
        }
    }
    tracing::info!("Alert dispatcher stopped");
}

async fn deliver(sink: &dyn AlertSink, event: &AlertEvent) {
    if let Err(e) = sink.deliver(event).await {
        tracing::error!("Failed to forward alert {} via {}: {}", event.name, sink.name(), e);
    }
}
