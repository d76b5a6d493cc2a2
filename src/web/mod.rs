//! Web server module.
//!
//! Serves the metrics exposition, a health check, the alert webhook and the
//! reload trigger.

mod handlers;

pub use handlers::*;

use crate::alert::AlertDispatcher;
use crate::config::ServerConfig;
use crate::metrics::MetricsStore;
use crate::registry::{ConfigError, RegistrySource};
use crate::scheduler::{ApplySummary, Scheduler};

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
///
/// Created once at startup; everything that needs the store, scheduler or
/// dispatcher gets it from here.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<MetricsStore>,
    pub scheduler: Arc<Scheduler>,
    pub registry: Arc<RegistrySource>,
    pub alerts: Arc<AlertDispatcher>,
    reload_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        store: Arc<MetricsStore>,
        scheduler: Arc<Scheduler>,
        registry: Arc<RegistrySource>,
        alerts: Arc<AlertDispatcher>,
    ) -> Self {
        Self {
            config,
            store,
            scheduler,
            registry,
            alerts,
            reload_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Re-read the targets file and apply it to the scheduler.
    ///
    /// On error the previous registry and its tasks stay in place.
    pub async fn reload(&self) -> Result<ApplySummary, ConfigError> {
        let _guard = self.reload_lock.lock().await;

        let registry = match self.registry.reload() {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(
                    "Reload of {} failed, keeping previous targets: {}",
                    self.registry.path().display(),
                    e
                );
                return Err(e);
            }
        };

        let summary = self.scheduler.apply(&registry).await;
        tracing::info!(
            "Reloaded {} targets (added {}, removed {}, restarted {})",
            registry.len(),
            summary.added.len(),
            summary.removed.len(),
            summary.restarted.len()
        );
        Ok(summary)
    }
}

/// Build the router with all routes.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(handlers::handle_metrics))
        .route("/health", get(handlers::handle_health))
        .route("/alert", post(handlers::handle_alert))
        .route("/-/reload", post(handlers::handle_reload))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
        .with_state(state)
}

/// Web server for the pinger.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Serve on the configured port until `shutdown` resolves.
    pub async fn start<F>(self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = routes(self.state);

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
