use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::Instrument;

use coproguard_core::{
    AdapteeCause, GuardError, InvocationState, Outcome, PluginResult, PolicyError, Result,
};

use crate::context::InvocationContext;
use crate::policy::{misordered_pair, Policy, PolicyChain};

/// Policy name reported when the executor itself refuses a call.
pub const EXECUTOR_POLICY: &str = "guard";

/// Runs every call into a wrapped plugin through an immutable policy chain.
///
/// Before-hooks run in chain order, the action runs on its own task under the
/// context deadline, after-hooks run in reverse order for every policy whose
/// before-hook ran. Whatever happens inside, the caller gets either the value
/// or one [`GuardError`].
pub struct PolicyVerifierAdapter<T: ?Sized> {
    adaptee: Arc<T>,
    chain: PolicyChain,
}

impl<T: ?Sized> Clone for PolicyVerifierAdapter<T> {
    fn clone(&self) -> Self {
        Self {
            adaptee: Arc::clone(&self.adaptee),
            chain: self.chain.clone(),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> PolicyVerifierAdapter<T> {
    pub fn builder() -> PolicyVerifierBuilder<T> {
        PolicyVerifierBuilder::new()
    }

    pub fn adaptee(&self) -> &Arc<T> {
        &self.adaptee
    }

    pub fn policies(&self) -> &PolicyChain {
        &self.chain
    }

    /// Guard an async plugin call. Both the closure and the future it returns
    /// run on their own task, so nothing the plugin does reaches the caller.
    pub async fn run_with_policies<R, F, Fut>(
        &self,
        operation: &str,
        ctx: &InvocationContext,
        action: F,
    ) -> Result<R>
    where
        F: FnOnce(InvocationContext) -> Fut + Send + 'static,
        Fut: Future<Output = PluginResult<R>> + Send + 'static,
        R: Send + 'static,
    {
        self.guard(operation, ctx, |ctx| {
            tokio::spawn(async move { action(ctx).await })
        })
        .await
    }

    /// Guard a blocking plugin call. The closure runs on the blocking pool.
    pub async fn run_blocking_with_policies<R, F>(
        &self,
        operation: &str,
        ctx: &InvocationContext,
        action: F,
    ) -> Result<R>
    where
        F: FnOnce(InvocationContext) -> PluginResult<R> + Send + 'static,
        R: Send + 'static,
    {
        self.guard(operation, ctx, |ctx| {
            tokio::task::spawn_blocking(move || action(ctx))
        })
        .await
    }

    async fn guard<R, S>(&self, operation: &str, ctx: &InvocationContext, spawn: S) -> Result<R>
    where
        S: FnOnce(InvocationContext) -> JoinHandle<PluginResult<R>> + Send,
        R: Send + 'static,
    {
        if operation.is_empty() {
            ctx.transition(InvocationState::Done);
            return Err(GuardError::PolicyRejected {
                operation: String::new(),
                policy: EXECUTOR_POLICY.to_string(),
                reason: "operation name must not be empty".to_string(),
            });
        }

        let span = tracing::debug_span!("guarded_call", operation);
        async move {
            ctx.mark_started();
            ctx.transition(InvocationState::RunningBefore);
            let (admitted, rejection) = self.run_before(operation, ctx);

            let rejected_before = rejection.is_some();
            let (outcome, mut value) = match rejection {
                Some(outcome) => {
                    ctx.transition(InvocationState::RejectedBefore);
                    (outcome, None)
                }
                None => {
                    ctx.transition(InvocationState::Executing);
                    let handle = spawn(ctx.clone());
                    let (outcome, value) = execute(operation, ctx, handle).await;
                    ctx.transition(InvocationState::settled(&outcome));
                    (outcome, value)
                }
            };

            ctx.transition(InvocationState::RunningAfter);
            let outcome = self.run_after(operation, ctx, admitted, outcome);
            ctx.transition(if rejected_before {
                InvocationState::RejectedBefore
            } else {
                InvocationState::settled(&outcome)
            });
            ctx.transition(InvocationState::Done);

            match outcome.into_error(operation) {
                None => value
                    .take()
                    .ok_or_else(|| GuardError::AdapteeFailure {
                        operation: operation.to_string(),
                        cause: AdapteeCause::new("guarded call produced no value".into()),
                    }),
                Some(err) => Err(err),
            }
        }
        .instrument(span)
        .await
    }

    /// Returns how many policies were admitted (the rejecting one included)
    /// and the rejection outcome, if any.
    fn run_before(&self, operation: &str, ctx: &InvocationContext) -> (usize, Option<Outcome>) {
        for (i, policy) in self.chain.as_slice().iter().enumerate() {
            if let Err(err) = call_hook(|| policy.before_invoke(operation, ctx)) {
                let reason = match err {
                    PolicyError::Reject(reason) => reason,
                    PolicyError::Internal(msg) => msg,
                };
                tracing::debug!(operation, policy = policy.name(), reason = %reason, "before-hook refused call");
                return (i + 1, Some(Outcome::rejected(policy.name(), reason)));
            }
        }
        (self.chain.len(), None)
    }

    fn run_after(
        &self,
        operation: &str,
        ctx: &InvocationContext,
        admitted: usize,
        mut outcome: Outcome,
    ) -> Outcome {
        for policy in self.chain.as_slice()[..admitted].iter().rev() {
            match call_hook(|| policy.after_invoke(operation, ctx, &outcome)) {
                Ok(()) => {}
                Err(PolicyError::Reject(reason)) if outcome.is_success() => {
                    tracing::warn!(operation, policy = policy.name(), reason = %reason, "after-hook vetoed successful call");
                    outcome = Outcome::rejected(policy.name(), reason);
                }
                Err(err) => {
                    tracing::warn!(
                        operation,
                        policy = policy.name(),
                        outcome = %outcome.kind(),
                        error = %err,
                        "policy internal error in after-hook, outcome kept"
                    );
                }
            }
        }
        outcome
    }
}

/// Wait for the spawned action under the context deadline and classify it.
async fn execute<R>(
    operation: &str,
    ctx: &InvocationContext,
    handle: JoinHandle<PluginResult<R>>,
) -> (Outcome, Option<R>) {
    let joined = match ctx.deadline() {
        Some(bound) => match tokio::time::timeout(bound, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                // The task is detached, not killed: plugin code may keep running.
                ctx.cancellation().cancel();
                tracing::warn!(operation, bound_ms = bound.as_millis() as u64, "deadline expired, detaching guarded call");
                return (Outcome::Timeout { bound }, None);
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(Ok(value)) => (Outcome::Success, Some(value)),
        Ok(Err(err)) => (Outcome::AdapteeFailure(AdapteeCause::new(err)), None),
        Err(join_err) if join_err.is_panic() => (
            Outcome::AdapteeFailure(AdapteeCause::from_panic(join_err.into_panic())),
            None,
        ),
        Err(join_err) => (
            Outcome::AdapteeFailure(AdapteeCause::new(Box::new(join_err))),
            None,
        ),
    }
}

/// Contain a panicking hook as a policy error.
fn call_hook<F>(hook: F) -> std::result::Result<(), PolicyError>
where
    F: FnOnce() -> std::result::Result<(), PolicyError>,
{
    match catch_unwind(AssertUnwindSafe(hook)) {
        Ok(res) => res,
        Err(payload) => Err(PolicyError::internal(format!(
            "hook panicked: {}",
            AdapteeCause::from_panic(payload)
        ))),
    }
}

/// Builder enforcing the construction-time checks.
pub struct PolicyVerifierBuilder<T: ?Sized> {
    adaptee: Option<Arc<T>>,
    policies: Vec<Arc<dyn Policy>>,
    allow_empty_chain: bool,
}

impl<T: ?Sized + Send + Sync + 'static> PolicyVerifierBuilder<T> {
    pub fn new() -> Self {
        Self {
            adaptee: None,
            policies: Vec::new(),
            allow_empty_chain: false,
        }
    }

    pub fn adaptee(mut self, adaptee: Arc<T>) -> Self {
        self.adaptee = Some(adaptee);
        self
    }

    pub fn policy(mut self, policy: impl Policy + 'static) -> Self {
        self.policies.push(Arc::new(policy));
        self
    }

    pub fn shared_policy(mut self, policy: Arc<dyn Policy>) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn policies(mut self, policies: impl IntoIterator<Item = Arc<dyn Policy>>) -> Self {
        self.policies.extend(policies);
        self
    }

    /// Accept a chain with no policies (pure containment, no hooks).
    pub fn allow_empty_chain(mut self) -> Self {
        self.allow_empty_chain = true;
        self
    }

    pub fn build(self) -> Result<PolicyVerifierAdapter<T>> {
        let adaptee = self
            .adaptee
            .ok_or_else(|| GuardError::Config("adaptee is required".into()))?;
        if self.policies.is_empty() && !self.allow_empty_chain {
            return Err(GuardError::Config("policy chain must not be empty".into()));
        }

        let order = self
            .policies
            .iter()
            .map(|p| (p.name(), p.vetoes(), p.reports_outcome()));
        if let Some((reporter, vetoer)) = misordered_pair(order) {
            return Err(GuardError::Config(format!(
                "policy `{reporter}` must come before vetoing policy `{vetoer}`"
            )));
        }

        let chain = PolicyChain::new(self.policies);
        tracing::info!(policies = ?chain, "setting up guarded execution policies");
        Ok(PolicyVerifierAdapter { adaptee, chain })
    }
}

impl<T: ?Sized + Send + Sync + 'static> Default for PolicyVerifierBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}
