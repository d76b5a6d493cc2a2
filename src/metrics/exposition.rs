//! Prometheus text exposition of a metrics snapshot.

use std::fmt::Write;

use super::models::MetricSample;

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

struct Family {
    name: &'static str,
    help: &'static str,
    kind: &'static str,
    value: fn(&MetricSample) -> f64,
}

const FAMILIES: [Family; 4] = [
    Family {
        name: "ping_latency_seconds",
        help: "Measured end-to-end latency for a target",
        kind: "gauge",
        value: |s| s.latency_seconds.unwrap_or(f64::NAN),
    },
    Family {
        name: "ping_up",
        help: "1 if last probe succeeded, otherwise 0",
        kind: "gauge",
        value: |s| s.up_value(),
    },
    Family {
        name: "ping_latency_threshold_seconds",
        help: "Alert threshold per target (seconds)",
        kind: "gauge",
        value: |s| s.threshold_seconds,
    },
    Family {
        name: "ping_errors_total",
        help: "Total probe errors",
        kind: "counter",
        value: |s| s.errors_total as f64,
    },
];

/// Render `snapshot` as exposition text. An empty snapshot renders as "".
pub fn render(snapshot: &[(String, MetricSample)]) -> String {
    let mut out = String::new();
    if snapshot.is_empty() {
        return out;
    }

    for family in &FAMILIES {
        let _ = writeln!(out, "# HELP {} {}", family.name, family.help);
        let _ = writeln!(out, "# TYPE {} {}", family.name, family.kind);
        for (target, sample) in snapshot {
            let _ = writeln!(
                out,
                "{}{{target=\"{}\"}} {}",
                family.name,
                escape_label(target),
                format_value((family.value)(sample))
            );
        }
    }

    out
}

fn escape_label(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

/// Shortest decimal that parses back to the same f64.
fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else {
        format!("{}", v)
    }
}
