//! Pinger - endpoint latency and availability prober
//!
//! Probes HTTP(S) and TCP endpoints on a schedule, exposes the results for
//! Prometheus to scrape, and receives Alertmanager webhooks.

mod alert;
mod config;
mod metrics;
mod probe;
mod registry;
mod scheduler;
mod web;

#[cfg(test)]
mod test_support;

use alert::{AlertDispatcher, AlertSink, LogSink, WebhookSink};
use config::ServerConfig;
use metrics::MetricsStore;
use probe::Prober;
use registry::{Defaults, RegistrySource};
use scheduler::{Scheduler, SchedulerOptions};
use web::{AppState, Server};

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long a forwarded alert may take before it is abandoned.
const ALERT_FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("pinger=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting pinger on port {}...", cfg.http_port);
    tracing::info!("Loading targets from {}", cfg.targets_file.display());

    let defaults = Defaults::from_config(&cfg)?;
    let registry = Arc::new(RegistrySource::load(cfg.targets_file.clone(), defaults)?);
    if registry.current().is_empty() {
        tracing::warn!("No targets configured in {}", cfg.targets_file.display());
    }

    let store = Arc::new(MetricsStore::new());
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        Prober::new()?,
        SchedulerOptions::default(),
    ));

    let sink: Arc<dyn AlertSink> = match &cfg.alert_forward_url {
        Some(raw) => {
            let url = url::Url::parse(raw)?;
            tracing::info!("Forwarding alerts to {}", url);
            Arc::new(WebhookSink::new(url, ALERT_FORWARD_TIMEOUT)?)
        }
        None => Arc::new(LogSink),
    };
    let alerts = Arc::new(AlertDispatcher::spawn(sink, cfg.alert_queue_capacity));

    // Start scheduler
    let summary = scheduler.apply(&registry.current()).await;
    tracing::info!("Monitoring {} targets", summary.added.len());

    let state = AppState::new(cfg, store, scheduler.clone(), registry, alerts.clone());
    spawn_reload_listener(state.clone());

    // Start web server
    Server::new(state).start(shutdown_signal()).await?;

    scheduler.shutdown().await;
    alerts.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Reload the targets file on SIGHUP.
#[cfg(unix)]
fn spawn_reload_listener(state: AppState) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("SIGHUP reload unavailable: {}", e);
                return;
            }
        };
        while hangup.recv().await.is_some() {
            tracing::info!("SIGHUP received, reloading targets");
            // Errors are logged by reload; the previous targets stay active
            let _ = state.reload().await;
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_listener(_state: AppState) {}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
