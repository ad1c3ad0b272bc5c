use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;

use coproguard_core::{Outcome, PolicyError};

use super::Policy;
use crate::context::InvocationContext;

/// Refuses an operation after `max_consecutive_failures` plugin failures in a row.
///
/// Counters are per operation name. A success resets the counter; timeouts and
/// rejections leave it untouched. Once tripped, the operation stays refused
/// until [`RetryLimitPolicy::reset`] is called.
pub struct RetryLimitPolicy {
    max_consecutive_failures: u32,
    failures: DashMap<String, AtomicU32>,
}

impl RetryLimitPolicy {
    pub fn new(max_consecutive_failures: u32) -> Self {
        Self {
            max_consecutive_failures,
            failures: DashMap::new(),
        }
    }

    pub fn consecutive_failures(&self, operation: &str) -> u32 {
        self.failures
            .get(operation)
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Re-arm a tripped operation.
    pub fn reset(&self, operation: &str) {
        if let Some(c) = self.failures.get(operation) {
            c.store(0, Ordering::Release);
        }
    }
}

impl Policy for RetryLimitPolicy {
    fn name(&self) -> &str {
        "retry_limit"
    }

    fn before_invoke(&self, operation: &str, _ctx: &InvocationContext) -> Result<(), PolicyError> {
        let failures = self.consecutive_failures(operation);
        if failures >= self.max_consecutive_failures {
            return Err(PolicyError::reject(format!(
                "{failures} consecutive failures reached limit of {}",
                self.max_consecutive_failures
            )));
        }
        Ok(())
    }

    fn after_invoke(
        &self,
        operation: &str,
        _ctx: &InvocationContext,
        outcome: &Outcome,
    ) -> Result<(), PolicyError> {
        match outcome {
            Outcome::AdapteeFailure(_) => {
                let counter = self
                    .failures
                    .entry(operation.to_string())
                    .or_insert_with(|| AtomicU32::new(0));
                counter.fetch_add(1, Ordering::AcqRel);
            }
            Outcome::Success => self.reset(operation),
            Outcome::Timeout { .. } | Outcome::PolicyRejected { .. } => {}
        }
        Ok(())
    }
}
