use std::sync::Arc;

use coproguard_core::{Outcome, PolicyError};

use super::Policy;
use crate::context::InvocationContext;
use crate::obs::MetricsSink;

/// Counts outcomes and records latency per `(namespace, operation)`.
pub struct MetricsPolicy {
    sink: Arc<dyn MetricsSink>,
    namespace: String,
}

impl MetricsPolicy {
    pub fn new(sink: Arc<dyn MetricsSink>, namespace: impl Into<String>) -> Self {
        Self {
            sink,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl Policy for MetricsPolicy {
    fn name(&self) -> &str {
        "metrics"
    }

    fn reports_outcome(&self) -> bool {
        true
    }

    fn after_invoke(
        &self,
        operation: &str,
        ctx: &InvocationContext,
        outcome: &Outcome,
    ) -> Result<(), PolicyError> {
        self.sink
            .record_outcome(&self.namespace, operation, outcome.kind());
        self.sink
            .record_latency(&self.namespace, operation, ctx.elapsed());
        Ok(())
    }
}
