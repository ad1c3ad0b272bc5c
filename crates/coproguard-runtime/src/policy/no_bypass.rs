use coproguard_core::{Outcome, PolicyError};

use super::Policy;
use crate::context::InvocationContext;

pub const MUTUALLY_EXCLUSIVE_REASON: &str =
    "mutually exclusive completion signals: bypass and complete are both set";

/// Vetoes a successful call that set both `bypass` and `complete`.
///
/// Only validates; it never sets either flag.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBypassOrCompletePolicy;

impl NoBypassOrCompletePolicy {
    pub fn new() -> Self {
        Self
    }
}

impl Policy for NoBypassOrCompletePolicy {
    fn name(&self) -> &str {
        "no_bypass_or_complete"
    }

    fn vetoes(&self) -> bool {
        true
    }

    fn after_invoke(
        &self,
        _operation: &str,
        ctx: &InvocationContext,
        outcome: &Outcome,
    ) -> Result<(), PolicyError> {
        if outcome.is_success() && ctx.bypass() && ctx.complete() {
            return Err(PolicyError::reject(MUTUALLY_EXCLUSIVE_REASON));
        }
        Ok(())
    }
}
