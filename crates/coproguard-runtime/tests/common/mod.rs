//! Test policies and helpers shared by the executor tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use coproguard_core::{Outcome, PolicyError};
use coproguard_runtime::context::{InvocationContext, NoEnvironment};
use coproguard_runtime::Policy;

pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn fresh_ctx() -> InvocationContext {
    InvocationContext::new(Arc::new(NoEnvironment))
}

/// What a `RecordingPolicy` does in its hooks besides recording.
#[derive(Clone, Default)]
pub enum Behavior {
    #[default]
    Pass,
    RejectBefore,
    PanicBefore,
    VetoAfter,
    FailAfter,
    PanicAfter,
}

/// Appends `before:<name>` / `after:<name>:<outcome>` to a shared log.
pub struct RecordingPolicy {
    name: String,
    log: EventLog,
    behavior: Behavior,
}

impl RecordingPolicy {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self::with_behavior(name, log, Behavior::Pass)
    }

    pub fn with_behavior(name: &str, log: &EventLog, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            log: Arc::clone(log),
            behavior,
        }
    }
}

impl Policy for RecordingPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn before_invoke(&self, _operation: &str, _ctx: &InvocationContext) -> Result<(), PolicyError> {
        self.log.lock().unwrap().push(format!("before:{}", self.name));
        match self.behavior {
            Behavior::RejectBefore => Err(PolicyError::reject(format!("{} says no", self.name))),
            Behavior::PanicBefore => panic!("{} exploded before", self.name),
            _ => Ok(()),
        }
    }

    fn after_invoke(
        &self,
        _operation: &str,
        _ctx: &InvocationContext,
        outcome: &Outcome,
    ) -> Result<(), PolicyError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("after:{}:{}", self.name, outcome.kind()));
        match self.behavior {
            Behavior::VetoAfter => Err(PolicyError::reject(format!("{} vetoes", self.name))),
            Behavior::FailAfter => Err(PolicyError::internal("after-hook broke")),
            Behavior::PanicAfter => panic!("{} exploded after", self.name),
            _ => Ok(()),
        }
    }
}

/// Refuses one operation name in its before-hook.
pub struct DenyOperation(pub &'static str);

impl Policy for DenyOperation {
    fn name(&self) -> &str {
        "deny_operation"
    }

    fn before_invoke(&self, operation: &str, _ctx: &InvocationContext) -> Result<(), PolicyError> {
        if operation == self.0 {
            return Err(PolicyError::reject("operation denied"));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("plugin broke: {0}")]
pub struct PluginBroke(pub String);
