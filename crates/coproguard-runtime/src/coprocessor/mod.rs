//! Coprocessor capability sets and their guarded facade.
//!
//! Plugins implement [`Coprocessor`] (lifecycle) and optionally
//! [`RegionObserver`] (data-path hooks). [`CoprocessorPolicyAdapter`]
//! implements the same traits and routes every call through the policy
//! chain, so the host can load it in place of the raw plugin.

pub mod adapter;
pub mod environment;

use std::sync::Arc;

use async_trait::async_trait;

use coproguard_core::PluginResult;

pub use adapter::{guard_error, CoprocessorPolicyAdapter};
pub use environment::{CoprocessorEnvironment, Delete, Get, ObserverContext, Put};

/// Lifecycle callbacks of a loaded coprocessor.
#[async_trait]
pub trait Coprocessor: Send + Sync + 'static {
    async fn start(&self, env: Arc<CoprocessorEnvironment>) -> PluginResult<()>;
    async fn stop(&self, env: Arc<CoprocessorEnvironment>) -> PluginResult<()>;
}

/// Data-path hooks. Defaults do nothing.
#[async_trait]
pub trait RegionObserver: Coprocessor {
    async fn pre_get(&self, _ctx: &ObserverContext, _get: &Get) -> PluginResult<()> {
        Ok(())
    }

    async fn pre_put(&self, _ctx: &ObserverContext, _put: &Put) -> PluginResult<()> {
        Ok(())
    }

    async fn post_put(&self, _ctx: &ObserverContext, _put: &Put) -> PluginResult<()> {
        Ok(())
    }

    async fn pre_delete(&self, _ctx: &ObserverContext, _delete: &Delete) -> PluginResult<()> {
        Ok(())
    }
}
