use coproguard_core::{Outcome, PolicyError};

use super::Policy;
use crate::context::InvocationContext;

/// Entry/exit log lines for every guarded call. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingPolicy;

impl LoggingPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl Policy for LoggingPolicy {
    fn name(&self) -> &str {
        "logging"
    }

    fn reports_outcome(&self) -> bool {
        true
    }

    fn before_invoke(&self, operation: &str, ctx: &InvocationContext) -> Result<(), PolicyError> {
        tracing::info!(operation, env = %ctx.summary(), "invoking guarded call");
        Ok(())
    }

    fn after_invoke(
        &self,
        operation: &str,
        ctx: &InvocationContext,
        outcome: &Outcome,
    ) -> Result<(), PolicyError> {
        let elapsed_ms = ctx.elapsed().as_millis() as u64;
        match outcome {
            Outcome::Success => {
                tracing::info!(operation, elapsed_ms, outcome = %outcome.kind(), "guarded call finished");
            }
            Outcome::AdapteeFailure(cause) => {
                tracing::warn!(operation, elapsed_ms, outcome = %outcome.kind(), cause = %cause, "guarded call failed");
            }
            Outcome::Timeout { .. } => {
                tracing::warn!(operation, elapsed_ms, outcome = %outcome.kind(), "guarded call timed out");
            }
            Outcome::PolicyRejected { policy, reason } => {
                tracing::warn!(operation, elapsed_ms, outcome = %outcome.kind(), policy = %policy, reason = %reason, "guarded call rejected");
            }
        }
        Ok(())
    }
}
