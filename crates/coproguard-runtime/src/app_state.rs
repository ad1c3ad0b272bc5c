//! Shared application state for the guard host.
//!
//! Wires the metrics registry and the guarded demo coprocessor together.
//! Startup errors are explicit (Result instead of panic).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use coproguard_core::error::Result;

use crate::config::GuardConfig;
use crate::coprocessor::{CoprocessorEnvironment, CoprocessorPolicyAdapter};
use crate::obs::{GuardMetrics, MetricsSink};
use crate::services::StatisticsObserver;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GuardConfig,
    metrics: Arc<GuardMetrics>,
    observer: Arc<CoprocessorPolicyAdapter<StatisticsObserver>>,
    env: Arc<CoprocessorEnvironment>,
    draining: AtomicBool,
}

impl AppState {
    pub fn new(cfg: GuardConfig) -> Result<Self> {
        let metrics = Arc::new(GuardMetrics::new());
        let observer = CoprocessorPolicyAdapter::from_config(
            Arc::new(StatisticsObserver::new()),
            &cfg.guard,
            Arc::clone(&metrics) as Arc<dyn MetricsSink>,
        )?;
        let env = Arc::new(CoprocessorEnvironment::new("statistics").with_priority(1073741823));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                metrics,
                observer: Arc::new(observer),
                env,
                draining: AtomicBool::new(false),
            }),
        })
    }

    pub fn cfg(&self) -> &GuardConfig {
        &self.inner.cfg
    }

    pub fn metrics(&self) -> Arc<GuardMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn observer(&self) -> Arc<CoprocessorPolicyAdapter<StatisticsObserver>> {
        Arc::clone(&self.inner.observer)
    }

    pub fn environment(&self) -> Arc<CoprocessorEnvironment> {
        Arc::clone(&self.inner.env)
    }

    /// Mark draining state.
    pub fn set_draining(&self) {
        self.inner.draining.store(true, Ordering::Relaxed);
    }

    /// Return whether draining is active.
    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::Relaxed)
    }

    /// Extra gauge lines appended to `/metrics`.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("coproguard_draining", u64::from(self.is_draining())),
            (
                "coproguard_policies_configured",
                self.inner.observer.verifier().policies().len() as u64,
            ),
        ]
    }
}
