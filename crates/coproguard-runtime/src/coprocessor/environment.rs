use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::context::{Environment, InvocationContext};

/// Host-provided environment a coprocessor instance is loaded into.
#[derive(Debug, Clone, Default)]
pub struct CoprocessorEnvironment {
    pub table: String,
    pub priority: i32,
    pub load_sequence: u64,
    pub properties: BTreeMap<String, String>,
}

impl CoprocessorEnvironment {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

impl Environment for CoprocessorEnvironment {
    fn summary(&self) -> String {
        format!(
            "table={} priority={} seq={}",
            self.table, self.priority, self.load_sequence
        )
    }
}

/// Context handed to observer hooks: the environment plus the completion
/// signals the host reads after the hook returns.
///
/// Create one per host call; it wraps a fresh [`InvocationContext`].
#[derive(Clone)]
pub struct ObserverContext {
    env: Arc<CoprocessorEnvironment>,
    invocation: InvocationContext,
}

impl ObserverContext {
    pub fn new(env: Arc<CoprocessorEnvironment>) -> Self {
        let invocation = InvocationContext::new(Arc::clone(&env) as Arc<dyn Environment>);
        Self { env, invocation }
    }

    pub fn environment(&self) -> &CoprocessorEnvironment {
        &self.env
    }

    pub fn invocation(&self) -> &InvocationContext {
        &self.invocation
    }

    /// Skip the host's default processing for this call.
    pub fn bypass(&self) {
        self.invocation.set_bypass();
    }

    /// Do not run the remaining coprocessors for this call.
    pub fn complete(&self) {
        self.invocation.set_complete();
    }

    pub fn should_bypass(&self) -> bool {
        self.invocation.bypass()
    }

    pub fn should_complete(&self) -> bool {
        self.invocation.complete()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        self.invocation.cancellation()
    }
}

impl std::fmt::Debug for ObserverContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverContext")
            .field("env", &self.env)
            .field("invocation", &self.invocation)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Get {
    pub row: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Put {
    pub row: Bytes,
    pub family: Bytes,
    pub qualifier: Bytes,
    pub value: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delete {
    pub row: Bytes,
}
