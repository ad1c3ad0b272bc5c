//! Lightweight in-process metrics.
//!
//! Invocation counters and latencies are stored as atomics and rendered by the
//! `/metrics` handler. Other backends plug in through `MetricsSink`.

pub mod metrics;

pub use metrics::{GuardMetrics, MetricsSink, OperationStats};
