use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use coproguard_core::{GuardError, PluginError, PluginResult, Result};

use crate::config::GuardSection;
use crate::context::{Environment, InvocationContext};
use crate::executor::PolicyVerifierAdapter;
use crate::obs::MetricsSink;
use crate::policy::{compile_policies, Policy};

use super::{Coprocessor, CoprocessorEnvironment, Delete, Get, ObserverContext, Put, RegionObserver};

/// Coprocessor that wraps every call of `T` so it is "safe" for the host.
///
/// Each trait method becomes one guarded invocation named after the method.
/// Errors returned to the host are always a boxed [`GuardError`]; use
/// [`guard_error`] to inspect them.
pub struct CoprocessorPolicyAdapter<T> {
    verifier: PolicyVerifierAdapter<T>,
}

impl<T: Coprocessor> CoprocessorPolicyAdapter<T> {
    pub fn new(verifier: PolicyVerifierAdapter<T>) -> Self {
        Self { verifier }
    }

    pub fn with_policies(adaptee: Arc<T>, policies: Vec<Arc<dyn Policy>>) -> Result<Self> {
        let verifier = PolicyVerifierAdapter::builder()
            .adaptee(adaptee)
            .policies(policies)
            .build()?;
        Ok(Self::new(verifier))
    }

    pub fn from_config(
        adaptee: Arc<T>,
        guard: &GuardSection,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        guard.validate()?;
        Self::with_policies(adaptee, compile_policies(guard, metrics))
    }

    /// Stock chain: 2s timeout, logging, metrics under "Coprocessors",
    /// bypass/complete invariant.
    pub fn with_default_policies(adaptee: Arc<T>, metrics: Arc<dyn MetricsSink>) -> Result<Self> {
        Self::from_config(adaptee, &GuardSection::default(), metrics)
    }

    pub fn verifier(&self) -> &PolicyVerifierAdapter<T> {
        &self.verifier
    }

    pub fn adaptee(&self) -> &Arc<T> {
        self.verifier.adaptee()
    }

    async fn guarded<F, Fut>(&self, operation: &str, ctx: &InvocationContext, call: F) -> PluginResult<()>
    where
        F: FnOnce(Arc<T>) -> Fut + Send + 'static,
        Fut: Future<Output = PluginResult<()>> + Send + 'static,
    {
        let adaptee = Arc::clone(self.verifier.adaptee());
        self.verifier
            .run_with_policies(operation, ctx, move |_| call(adaptee))
            .await
            .map_err(into_plugin_error)
    }
}

fn into_plugin_error(err: GuardError) -> PluginError {
    Box::new(err)
}

/// The guard error behind an error returned by the adapter.
pub fn guard_error(err: &PluginError) -> Option<&GuardError> {
    err.downcast_ref::<GuardError>()
}

#[async_trait]
impl<T: Coprocessor> Coprocessor for CoprocessorPolicyAdapter<T> {
    async fn start(&self, env: Arc<CoprocessorEnvironment>) -> PluginResult<()> {
        let ctx = InvocationContext::new(Arc::clone(&env) as Arc<dyn Environment>);
        self.guarded("start", &ctx, move |adaptee| async move {
            adaptee.start(env).await
        })
        .await
    }

    async fn stop(&self, env: Arc<CoprocessorEnvironment>) -> PluginResult<()> {
        let ctx = InvocationContext::new(Arc::clone(&env) as Arc<dyn Environment>);
        self.guarded("stop", &ctx, move |adaptee| async move {
            adaptee.stop(env).await
        })
        .await
    }
}

#[async_trait]
impl<T: RegionObserver> RegionObserver for CoprocessorPolicyAdapter<T> {
    async fn pre_get(&self, ctx: &ObserverContext, get: &Get) -> PluginResult<()> {
        let (octx, get) = (ctx.clone(), get.clone());
        self.guarded("pre_get", ctx.invocation(), move |adaptee| async move {
            adaptee.pre_get(&octx, &get).await
        })
        .await
    }

    async fn pre_put(&self, ctx: &ObserverContext, put: &Put) -> PluginResult<()> {
        let (octx, put) = (ctx.clone(), put.clone());
        self.guarded("pre_put", ctx.invocation(), move |adaptee| async move {
            adaptee.pre_put(&octx, &put).await
        })
        .await
    }

    async fn post_put(&self, ctx: &ObserverContext, put: &Put) -> PluginResult<()> {
        let (octx, put) = (ctx.clone(), put.clone());
        self.guarded("post_put", ctx.invocation(), move |adaptee| async move {
            adaptee.post_put(&octx, &put).await
        })
        .await
    }

    async fn pre_delete(&self, ctx: &ObserverContext, delete: &Delete) -> PluginResult<()> {
        let (octx, delete) = (ctx.clone(), delete.clone());
        self.guarded("pre_delete", ctx.invocation(), move |adaptee| async move {
            adaptee.pre_delete(&octx, &delete).await
        })
        .await
    }
}
