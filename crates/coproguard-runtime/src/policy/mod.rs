//! Policy layer (timeout, logging, metrics, invariants, limits).
//!
//! A policy is a before/after hook pair around one guarded invocation.
//! Policies are compiled once into an immutable [`PolicyChain`] and shared by
//! every concurrent call through the adapter that owns it.

pub mod logging;
pub mod max_memory;
pub mod metrics;
pub mod no_bypass;
pub mod retry_limit;
pub mod timeout;

use std::sync::Arc;

use coproguard_core::{Outcome, PolicyError};

use crate::config::{GuardSection, PolicySpec};
use crate::context::InvocationContext;
use crate::obs::MetricsSink;

pub use logging::LoggingPolicy;
pub use max_memory::{MaxMemoryPolicy, MemoryProbe, ProcStatmProbe};
pub use metrics::MetricsPolicy;
pub use no_bypass::NoBypassOrCompletePolicy;
pub use retry_limit::RetryLimitPolicy;
pub use timeout::TimeoutPolicy;

/// Cross-cutting behavior around one guarded call.
///
/// Hooks run synchronously on the invoking task and must not block.
pub trait Policy: Send + Sync {
    fn name(&self) -> &str;

    /// Returning an error refuses the call: the action never runs.
    fn before_invoke(&self, _operation: &str, _ctx: &InvocationContext) -> Result<(), PolicyError> {
        Ok(())
    }

    /// `PolicyError::Reject` on a `Success` outcome vetoes the result.
    /// Any other error is logged and ignored.
    fn after_invoke(
        &self,
        _operation: &str,
        _ctx: &InvocationContext,
        _outcome: &Outcome,
    ) -> Result<(), PolicyError> {
        Ok(())
    }

    /// Whether the after-hook may veto a successful call.
    fn vetoes(&self) -> bool {
        false
    }

    /// Whether the after-hook reports the outcome (counters, exit logs).
    ///
    /// After-hooks run in reverse, so a reporting policy must sit before every
    /// vetoing one in the chain to observe the outcome the caller receives.
    fn reports_outcome(&self) -> bool {
        false
    }
}

/// First `(reporter, vetoer)` pair where the reporter would run its after-hook
/// before the vetoer settles the outcome.
pub fn misordered_pair<'a, I>(chain: I) -> Option<(&'a str, &'a str)>
where
    I: IntoIterator<Item = (&'a str, bool, bool)>,
{
    let mut first_vetoer = None;
    for (name, vetoes, reports) in chain {
        if reports {
            if let Some(vetoer) = first_vetoer {
                return Some((name, vetoer));
            }
        }
        if vetoes && first_vetoer.is_none() {
            first_vetoer = Some(name);
        }
    }
    None
}

/// Ordered, immutable list of policies.
#[derive(Clone)]
pub struct PolicyChain {
    policies: Arc<[Arc<dyn Policy>]>,
}

impl PolicyChain {
    pub fn new(policies: Vec<Arc<dyn Policy>>) -> Self {
        Self {
            policies: policies.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn as_slice(&self) -> &[Arc<dyn Policy>] {
        &self.policies
    }

    pub fn names(&self) -> Vec<&str> {
        self.policies.iter().map(|p| p.name()).collect()
    }
}

impl std::fmt::Debug for PolicyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Build the policies listed in the guard section, in order.
pub fn compile_policies(guard: &GuardSection, metrics: Arc<dyn MetricsSink>) -> Vec<Arc<dyn Policy>> {
    guard
        .policies
        .iter()
        .map(|spec| -> Arc<dyn Policy> {
            match spec {
                PolicySpec::Timeout { timeout_ms } => {
                    Arc::new(TimeoutPolicy::from_millis(*timeout_ms))
                }
                PolicySpec::Logging => Arc::new(LoggingPolicy::new()),
                PolicySpec::Metrics => {
                    Arc::new(MetricsPolicy::new(Arc::clone(&metrics), guard.namespace.clone()))
                }
                PolicySpec::NoBypassOrComplete => Arc::new(NoBypassOrCompletePolicy::new()),
                PolicySpec::RetryLimit {
                    max_consecutive_failures,
                } => Arc::new(RetryLimitPolicy::new(*max_consecutive_failures)),
                PolicySpec::MaxMemory {
                    byte_bound,
                    sample_window_ms,
                } => Arc::new(MaxMemoryPolicy::with_probe(
                    *byte_bound,
                    std::time::Duration::from_millis(*sample_window_ms),
                    Arc::new(ProcStatmProbe),
                )),
            }
        })
        .collect()
}
