//! Metric model types.

use crate::probe::ProbeResult;

/// Current gauge values for one target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSample {
    /// Last observed latency; kept (stale) while the target is failing.
    pub latency_seconds: Option<f64>,
    pub up: bool,
    pub threshold_seconds: f64,
    pub errors_total: u64,
    pub probes_total: u64,
}

impl MetricSample {
    pub fn new(threshold_seconds: f64) -> Self {
        Self {
            latency_seconds: None,
            up: false,
            threshold_seconds,
            errors_total: 0,
            probes_total: 0,
        }
    }

    pub fn up_value(&self) -> f64 {
        if self.up {
            1.0
        } else {
            0.0
        }
    }

    pub(crate) fn apply(&mut self, result: &ProbeResult) {
        self.threshold_seconds = result.target.threshold_seconds;
        if let Some(latency) = result.latency_seconds() {
            self.latency_seconds = Some(latency);
        }
        self.up = result.success();
        if !self.up {
            self.errors_total += 1;
        }
        self.probes_total += 1;
    }
}
