//! Concurrent in-memory metrics store.

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::models::MetricSample;
use crate::probe::ProbeResult;

/// Process-wide map from target name to its current sample.
///
/// Each entry has its own lock, so workers updating different targets never
/// contend. The outer lock is only taken for writing when an entry is created
/// or when entries are pruned.
#[derive(Default)]
pub struct MetricsStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Arc<Mutex<MetricSample>>>,
    /// Names allowed to create entries, set by the last prune.
    allowed: Option<HashSet<String>>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a probe result into the entry for its target (last write wins).
    ///
    /// Returns `false` if the target was pruned and the result was dropped.
    pub fn record(&self, result: &ProbeResult) -> bool {
        let name = &result.target.name;

        {
            let inner = self.inner.read();
            if let Some(entry) = inner.entries.get(name) {
                entry.lock().apply(result);
                return true;
            }
        }

        let mut inner = self.inner.write();
        if let Some(allowed) = &inner.allowed {
            if !allowed.contains(name) {
                return false;
            }
        }

        let entry = inner
            .entries
            .entry(name.clone())
            .or_insert_with(|| Arc::new(Mutex::new(MetricSample::new(result.target.threshold_seconds))));
        entry.lock().apply(result);
        true
    }

    /// Point-in-time copy of every entry, sorted by target name.
    ///
    /// Each entry is copied under its own lock, so no entry is ever seen half
    /// updated. Different entries may come from slightly different instants.
    pub fn snapshot(&self) -> Vec<(String, MetricSample)> {
        let inner = self.inner.read();
        let mut out: Vec<(String, MetricSample)> = inner
            .entries
            .iter()
            .map(|(name, entry)| (name.clone(), *entry.lock()))
            .collect();
        drop(inner);

        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Drop entries whose target is not in `valid`, and refuse to recreate them.
    ///
    /// Returns the number of entries removed.
    pub fn prune(&self, valid: &HashSet<String>) -> usize {
        let mut inner = self.inner.write();
        let before = inner.entries.len();
        inner.entries.retain(|name, _| valid.contains(name));
        inner.allowed = Some(valid.clone());
        before - inner.entries.len()
    }

    pub fn get(&self, name: &str) -> Option<MetricSample> {
        self.inner.read().entries.get(name).map(|e| *e.lock())
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }
}
