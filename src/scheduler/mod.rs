//! Scheduler module for running probes.
//!
//! Every target gets its own task that ticks at the target's interval, runs
//! one probe at a time and records the result. Reloads diff the new registry
//! against the running tasks so unchanged targets keep their task.

use crate::metrics::MetricsStore;
use crate::probe::{ProbeResult, Prober};
use crate::registry::{Registry, Target};

use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Scheduler tuning.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// Delay each task's first probe by a random fraction of its interval.
    pub jitter: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self { jitter: true }
    }
}

/// What a call to [`Scheduler::apply`] changed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ApplySummary {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Targets whose definition changed; their task was replaced.
    pub restarted: Vec<String>,
    pub unchanged: Vec<String>,
}

struct Worker {
    target: Arc<Target>,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// The main scheduler that orchestrates probe execution.
pub struct Scheduler {
    store: Arc<MetricsStore>,
    prober: Prober,
    options: SchedulerOptions,
    workers: Mutex<HashMap<String, Worker>>,
}

impl Scheduler {
    pub fn new(store: Arc<MetricsStore>, prober: Prober, options: SchedulerOptions) -> Self {
        Self {
            store,
            prober,
            options,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Make the running tasks match `registry`.
    ///
    /// Removed or changed targets are told to stop; a probe already in flight
    /// finishes but its result is discarded. Their store entries are pruned.
    /// New and changed targets get a fresh task.
    pub async fn apply(&self, registry: &Registry) -> ApplySummary {
        let mut workers = self.workers.lock().await;
        let mut summary = ApplySummary::default();

        let stale: Vec<String> = workers
            .iter()
            .filter(|(name, worker)| match registry.get(name) {
                Some(target) => **target != *worker.target,
                None => true,
            })
            .map(|(name, _)| name.clone())
            .collect();

        for name in stale {
            if let Some(worker) = workers.remove(&name) {
                let _ = worker.stop.send(true);
                if registry.get(&name).is_some() {
                    summary.restarted.push(name);
                } else {
                    tracing::info!("Scheduler: Removed target {}", name);
                    summary.removed.push(name);
                }
            }
        }

        let pruned = self.store.prune(&registry.names());
        if pruned > 0 {
            tracing::debug!("Pruned {} metric entries", pruned);
        }

        for target in registry.targets() {
            if workers.contains_key(&target.name) {
                summary.unchanged.push(target.name.clone());
                continue;
            }

            if !summary.restarted.contains(&target.name) {
                tracing::info!(
                    "Scheduler: Adding {} target {} ({}, every {:?})",
                    target.endpoint.scheme(),
                    target.name,
                    target.uri,
                    target.interval
                );
                summary.added.push(target.name.clone());
            } else {
                tracing::info!("Scheduler: Restarting changed target {}", target.name);
            }

            let worker = self.spawn_worker(target.clone());
            workers.insert(target.name.clone(), worker);
        }

        summary
    }

    fn spawn_worker(&self, target: Arc<Target>) -> Worker {
        let (stop, stop_rx) = watch::channel(false);
        let offset = if self.options.jitter {
            jitter(target.interval)
        } else {
            Duration::ZERO
        };

        let handle = tokio::spawn(run_probe_loop(
            target.clone(),
            self.prober.clone(),
            self.store.clone(),
            offset,
            stop_rx,
        ));

        Worker { target, stop, handle }
    }

    /// Names of targets with a running task, sorted.
    pub async fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workers.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop every task and wait for in-flight probes to finish.
    pub async fn shutdown(&self) {
        let drained: Vec<Worker> = self.workers.lock().await.drain().map(|(_, w)| w).collect();
        tracing::info!("Scheduler: Stopping {} targets", drained.len());

        for worker in &drained {
            let _ = worker.stop.send(true);
        }
        for worker in drained {
            if let Err(e) = worker.handle.await {
                tracing::error!("Probe task for {} failed: {}", worker.target.name, e);
            }
        }
    }
}

/// Floor for a worker's tick period; `interval_at` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

fn jitter(interval: Duration) -> Duration {
    if interval.is_zero() {
        return Duration::ZERO;
    }
    rand::thread_rng().gen_range(Duration::ZERO..interval)
}

/// Run the probe loop for a single target.
///
/// The probe is awaited inside the loop, so a target never overlaps itself.
/// Ticks missed while a probe overran are skipped, not replayed.
async fn run_probe_loop(
    target: Arc<Target>,
    prober: Prober,
    store: Arc<MetricsStore>,
    offset: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let period = target.interval.max(MIN_INTERVAL);
    let mut interval = tokio::time::interval_at(Instant::now() + offset, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop_rx.changed() => {
                break;
            }
            _ = interval.tick() => {
                let result = prober.probe(target.clone(), target.timeout).await;

                if *stop_rx.borrow() {
                    tracing::debug!("Discarding result for stopped target {}", target.name);
                    break;
                }

                log_result(&result);
                store.record(&result);
            }
        }
    }
}

fn log_result(result: &ProbeResult) {
    match &result.error {
        None => tracing::trace!(
            "Probe {} ok in {:.3}s",
            result.target.name,
            result.latency_seconds().unwrap_or_default()
        ),
        Some(e) => tracing::debug!(
            "Probe failed for {} at {} ({}): {}",
            result.target.name,
            result.time.format("%H:%M:%S%.3f"),
            e.kind(),
            e
        ),
    }
}
