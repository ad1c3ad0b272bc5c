//! In-process metrics registry for guarded invocations.
//!
//! Counter and histogram types with dynamic labels backed by `DashMap`.
//! Labels are flattened into sorted key vectors to keep deterministic
//! ordering. Histogram buckets are fixed in microseconds to avoid floating
//! point math. Every update is a single atomic `fetch_add`.

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use coproguard_core::OutcomeKind;

/// Destination for the counters and latencies recorded by `MetricsPolicy`.
///
/// Implementations must be safe under concurrent calls and must only ever
/// increase what they record.
pub trait MetricsSink: Send + Sync {
    fn record_outcome(&self, namespace: &str, operation: &str, kind: OutcomeKind);
    fn record_latency(&self, namespace: &str, operation: &str, elapsed: Duration);
}

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn label_key(labels: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut key: Vec<(String, String)> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

fn label_str(key: &[(String, String)]) -> String {
    key.iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<Vec<(String, String)>, AtomicU64>,
}

impl CounterVec {
    /// Increment by 1.
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    /// Increment by an arbitrary value.
    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        let counter = self
            .map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    /// Current value, 0 for a label set never seen.
    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Render in Prometheus text exposition format.
    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} counter", name);
        for r in self.map.iter() {
            let val = r.value().load(Ordering::Relaxed);
            let _ = writeln!(out, "{}{{{}}} {}", name, label_str(r.key()), val);
        }
    }
}

// Fixed buckets in microseconds:
// 100us, 500us, 1ms, 5ms, 10ms, 50ms, 100ms, 500ms, 1s, 2s, 5s, 10s
const BUCKETS_MICROS: [u64; 12] = [
    100, 500, 1_000, 5_000, 10_000, 50_000, 100_000, 500_000, 1_000_000, 2_000_000, 5_000_000,
    10_000_000,
];

#[derive(Default)]
struct AtomicHistogram {
    count: AtomicU64,
    sum: AtomicU64,
    buckets: [AtomicU64; 12],
}

/// Point-in-time copy of one histogram series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum_micros: u64,
}

#[derive(Default)]
pub struct HistogramVec {
    map: DashMap<Vec<(String, String)>, AtomicHistogram>,
}

impl HistogramVec {
    /// Observe a duration and increment cumulative buckets (microsecond scale).
    pub fn observe(&self, labels: &[(&str, &str)], duration: Duration) {
        let hist = self
            .map
            .entry(label_key(labels))
            .or_insert_with(AtomicHistogram::default);
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);

        hist.count.fetch_add(1, Ordering::Relaxed);
        hist.sum.fetch_add(micros, Ordering::Relaxed);

        // Cumulative: every bucket whose bound covers the value.
        for (i, &b) in BUCKETS_MICROS.iter().enumerate() {
            if micros <= b {
                hist.buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self, labels: &[(&str, &str)]) -> HistogramSnapshot {
        self.map
            .get(&label_key(labels))
            .map(|h| HistogramSnapshot {
                count: h.count.load(Ordering::Relaxed),
                sum_micros: h.sum.load(Ordering::Relaxed),
            })
            .unwrap_or_default()
    }

    /// Render in Prometheus text exposition format (unit: microseconds).
    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} histogram", name);
        for r in self.map.iter() {
            let hist = r.value();
            let labels = label_str(r.key());
            let prefix = if labels.is_empty() {
                String::new()
            } else {
                format!("{},", labels)
            };

            for (i, &le) in BUCKETS_MICROS.iter().enumerate() {
                let count = hist.buckets[i].load(Ordering::Relaxed);
                let _ = writeln!(out, "{}_bucket{{{}le=\"{}\"}} {}", name, prefix, le, count);
            }
            let count = hist.count.load(Ordering::Relaxed);
            let _ = writeln!(out, "{}_bucket{{{}le=\"+Inf\"}} {}", name, prefix, count);

            let sum = hist.sum.load(Ordering::Relaxed);
            let _ = writeln!(out, "{}_sum{{{}}} {}", name, labels, sum);
            let _ = writeln!(out, "{}_count{{{}}} {}", name, labels, count);
        }
    }
}

/// Per `(namespace, operation)` view of the outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationStats {
    pub success: u64,
    pub failure: u64,
    pub timeout: u64,
    pub rejected: u64,
    pub latency: HistogramSnapshot,
}

impl OperationStats {
    pub fn total(&self) -> u64 {
        self.success + self.failure + self.timeout + self.rejected
    }

    pub fn count(&self, kind: OutcomeKind) -> u64 {
        match kind {
            OutcomeKind::Success => self.success,
            OutcomeKind::Failure => self.failure,
            OutcomeKind::Timeout => self.timeout,
            OutcomeKind::Rejected => self.rejected,
        }
    }
}

/// Built-in registry. Construct once and inject it into every `MetricsPolicy`.
#[derive(Default)]
pub struct GuardMetrics {
    pub invocations: CounterVec,
    pub invocation_duration: HistogramVec, // In Microseconds
}

impl GuardMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operation_stats(&self, namespace: &str, operation: &str) -> OperationStats {
        let count = |kind: OutcomeKind| {
            self.invocations.get(&[
                ("namespace", namespace),
                ("operation", operation),
                ("outcome", kind.as_str()),
            ])
        };
        OperationStats {
            success: count(OutcomeKind::Success),
            failure: count(OutcomeKind::Failure),
            timeout: count(OutcomeKind::Timeout),
            rejected: count(OutcomeKind::Rejected),
            latency: self
                .invocation_duration
                .snapshot(&[("namespace", namespace), ("operation", operation)]),
        }
    }

    /// Render all registered metrics plus any extra lines provided by callers.
    pub fn render(&self, extra: &[(&str, u64)]) -> String {
        let mut out = String::new();
        self.invocations
            .render("coproguard_invocations_total", &mut out);
        self.invocation_duration
            .render("coproguard_invocation_duration_micros", &mut out);
        for (k, v) in extra {
            let _ = writeln!(out, "{} {}", k, v);
        }
        out
    }
}

impl MetricsSink for GuardMetrics {
    fn record_outcome(&self, namespace: &str, operation: &str, kind: OutcomeKind) {
        self.invocations.inc(&[
            ("namespace", namespace),
            ("operation", operation),
            ("outcome", kind.as_str()),
        ]);
    }

    fn record_latency(&self, namespace: &str, operation: &str, elapsed: Duration) {
        self.invocation_duration
            .observe(&[("namespace", namespace), ("operation", operation)], elapsed);
    }
}
