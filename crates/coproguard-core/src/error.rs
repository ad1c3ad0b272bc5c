//! Shared error type across coproguard crates.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Error type plugin code returns from a guarded call.
pub type PluginError = Box<dyn StdError + Send + Sync + 'static>;

/// Result of a raw plugin call, before classification.
pub type PluginResult<T> = std::result::Result<T, PluginError>;

/// Caller-facing error kinds (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The guarded call did not finish within its bound.
    Timeout,
    /// The plugin raised an error or panicked.
    AdapteeFailure,
    /// A policy refused the call or vetoed its result.
    PolicyRejected,
    /// The guard was misconfigured at construction time.
    Config,
}

impl ErrorKind {
    /// String representation used in logs and metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::AdapteeFailure => "ADAPTEE_FAILURE",
            ErrorKind::PolicyRejected => "POLICY_REJECTED",
            ErrorKind::Config => "CONFIG",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, GuardError>;

/// The single contained error a guarded call can surface.
#[derive(Debug, Clone, Error)]
pub enum GuardError {
    #[error("operation `{operation}` timed out after {bound:?}")]
    Timeout { operation: String, bound: Duration },
    #[error("operation `{operation}` failed in adaptee: {cause}")]
    AdapteeFailure {
        operation: String,
        #[source]
        cause: AdapteeCause,
    },
    #[error("operation `{operation}` rejected by policy `{policy}`: {reason}")]
    PolicyRejected {
        operation: String,
        policy: String,
        reason: String,
    },
    #[error("invalid guard configuration: {0}")]
    Config(String),
}

impl GuardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GuardError::Timeout { .. } => ErrorKind::Timeout,
            GuardError::AdapteeFailure { .. } => ErrorKind::AdapteeFailure,
            GuardError::PolicyRejected { .. } => ErrorKind::PolicyRejected,
            GuardError::Config(_) => ErrorKind::Config,
        }
    }

    /// Original plugin error, only for `AdapteeFailure`.
    pub fn cause(&self) -> Option<&AdapteeCause> {
        match self {
            GuardError::AdapteeFailure { cause, .. } => Some(cause),
            _ => None,
        }
    }

    /// Name of the rejecting policy, only for `PolicyRejected`.
    pub fn policy_name(&self) -> Option<&str> {
        match self {
            GuardError::PolicyRejected { policy, .. } => Some(policy),
            _ => None,
        }
    }

    /// Operation the error was raised for. `None` for configuration errors.
    pub fn operation(&self) -> Option<&str> {
        match self {
            GuardError::Timeout { operation, .. }
            | GuardError::AdapteeFailure { operation, .. }
            | GuardError::PolicyRejected { operation, .. } => Some(operation),
            GuardError::Config(_) => None,
        }
    }
}

/// Error returned by a policy hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Refuse entry (before-hook) or veto a successful result (after-hook).
    #[error("rejected: {0}")]
    Reject(String),
    /// The policy itself malfunctioned. Logged, never surfaced.
    #[error("policy internal error: {0}")]
    Internal(String),
}

impl PolicyError {
    pub fn reject(reason: impl Into<String>) -> Self {
        PolicyError::Reject(reason.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        PolicyError::Internal(msg.into())
    }
}

/// Shareable wrapper around the error raised by the wrapped plugin.
///
/// The original error stays reachable through [`StdError::source`] and
/// [`AdapteeCause::inner`], so hosts can downcast it.
#[derive(Clone)]
pub struct AdapteeCause(Arc<dyn StdError + Send + Sync + 'static>);

impl AdapteeCause {
    pub fn new(err: PluginError) -> Self {
        Self(Arc::from(err))
    }

    /// Build a cause from a panic payload caught at the task boundary.
    pub fn from_panic(payload: Box<dyn Any + Send + 'static>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self(Arc::new(PanicCause { message }))
    }

    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.0.as_ref()
    }

    pub fn is_panic(&self) -> bool {
        self.0.downcast_ref::<PanicCause>().is_some()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }
}

impl fmt::Debug for AdapteeCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AdapteeCause").field(&self.0).finish()
    }
}

impl fmt::Display for AdapteeCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl StdError for AdapteeCause {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.0.as_ref())
    }
}

/// A panic raised by plugin code.
#[derive(Debug, Clone, Error)]
#[error("plugin panicked: {message}")]
pub struct PanicCause {
    pub message: String,
}
