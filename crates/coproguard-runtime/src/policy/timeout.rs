use std::time::Duration;

use coproguard_core::{Outcome, PolicyError};

use super::Policy;
use crate::context::InvocationContext;

/// Supplies the wall-clock bound the executor enforces.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutPolicy {
    bound: Duration,
}

impl TimeoutPolicy {
    pub fn new(bound: Duration) -> Self {
        Self { bound }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    pub fn bound(&self) -> Duration {
        self.bound
    }
}

impl Policy for TimeoutPolicy {
    fn name(&self) -> &str {
        "timeout"
    }

    fn before_invoke(&self, _operation: &str, ctx: &InvocationContext) -> Result<(), PolicyError> {
        ctx.set_deadline(self.bound);
        Ok(())
    }

    fn after_invoke(
        &self,
        operation: &str,
        ctx: &InvocationContext,
        outcome: &Outcome,
    ) -> Result<(), PolicyError> {
        let elapsed = ctx.elapsed();
        if let Outcome::Timeout { bound } = outcome {
            tracing::warn!(
                operation,
                bound_ms = bound.as_millis() as u64,
                elapsed_ms = elapsed.as_millis() as u64,
                "guarded call exceeded its bound"
            );
        } else {
            tracing::debug!(
                operation,
                bound_ms = self.bound.as_millis() as u64,
                elapsed_ms = elapsed.as_millis() as u64,
                "guarded call within bound"
            );
        }
        Ok(())
    }
}
