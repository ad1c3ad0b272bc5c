use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use coproguard_core::PluginResult;

use crate::coprocessor::{
    Coprocessor, CoprocessorEnvironment, Delete, Get, ObserverContext, Put, RegionObserver,
};

/// Property naming a row prefix whose deletes are bypassed.
pub const PROTECTED_PREFIX_KEY: &str = "statistics.protected_prefix";

/// Counts every observer hook it sees. Useful to prove the guard forwards
/// each host call exactly once.
#[derive(Default)]
pub struct StatisticsObserver {
    calls: DashMap<&'static str, AtomicU64>,
}

impl StatisticsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, hook: &'static str) {
        self.calls
            .entry(hook)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, hook: &str) -> u64 {
        self.calls
            .get(hook)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> BTreeMap<&'static str, u64> {
        self.calls
            .iter()
            .map(|e| (*e.key(), e.value().load(Ordering::Relaxed)))
            .collect()
    }

    /// Log current counters; `clear` resets them afterwards.
    pub fn print_statistics(&self, clear: bool) {
        for (hook, count) in self.snapshot() {
            tracing::info!(hook, count, "observer statistics");
        }
        if clear {
            self.calls.clear();
        }
    }
}

#[async_trait]
impl Coprocessor for StatisticsObserver {
    async fn start(&self, env: Arc<CoprocessorEnvironment>) -> PluginResult<()> {
        self.record("start");
        tracing::info!(table = %env.table, "statistics observer started");
        Ok(())
    }

    async fn stop(&self, env: Arc<CoprocessorEnvironment>) -> PluginResult<()> {
        self.record("stop");
        tracing::info!(table = %env.table, "statistics observer stopped");
        self.print_statistics(false);
        Ok(())
    }
}

#[async_trait]
impl RegionObserver for StatisticsObserver {
    async fn pre_get(&self, _ctx: &ObserverContext, _get: &Get) -> PluginResult<()> {
        self.record("pre_get");
        Ok(())
    }

    async fn pre_put(&self, _ctx: &ObserverContext, _put: &Put) -> PluginResult<()> {
        self.record("pre_put");
        Ok(())
    }

    async fn post_put(&self, _ctx: &ObserverContext, _put: &Put) -> PluginResult<()> {
        self.record("post_put");
        Ok(())
    }

    async fn pre_delete(&self, ctx: &ObserverContext, delete: &Delete) -> PluginResult<()> {
        self.record("pre_delete");
        if let Some(prefix) = ctx.environment().property(PROTECTED_PREFIX_KEY) {
            if delete.row.starts_with(prefix.as_bytes()) {
                ctx.bypass();
            }
        }
        Ok(())
    }
}
