//! Classified result of one guarded invocation.
//!
//! `Outcome` carries no success value: the executor keeps the value aside so
//! policies can observe every invocation through one non-generic type.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::error::{AdapteeCause, GuardError};

/// Outcome kind, used as the metrics/log label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Failure,
    Timeout,
    Rejected,
}

impl OutcomeKind {
    pub const ALL: [OutcomeKind; 4] = [
        OutcomeKind::Success,
        OutcomeKind::Failure,
        OutcomeKind::Timeout,
        OutcomeKind::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::Failure => "failure",
            OutcomeKind::Timeout => "timeout",
            OutcomeKind::Rejected => "rejected",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome handed to after-hooks and translated for the caller.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success,
    AdapteeFailure(AdapteeCause),
    Timeout { bound: Duration },
    PolicyRejected { policy: String, reason: String },
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Success => OutcomeKind::Success,
            Outcome::AdapteeFailure(_) => OutcomeKind::Failure,
            Outcome::Timeout { .. } => OutcomeKind::Timeout,
            Outcome::PolicyRejected { .. } => OutcomeKind::Rejected,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn rejected(policy: impl Into<String>, reason: impl Into<String>) -> Self {
        Outcome::PolicyRejected {
            policy: policy.into(),
            reason: reason.into(),
        }
    }

    /// Translate a non-success outcome into the caller-facing error.
    /// Returns `None` for `Success`.
    pub fn into_error(self, operation: &str) -> Option<GuardError> {
        let operation = operation.to_string();
        match self {
            Outcome::Success => None,
            Outcome::AdapteeFailure(cause) => Some(GuardError::AdapteeFailure { operation, cause }),
            Outcome::Timeout { bound } => Some(GuardError::Timeout { operation, bound }),
            Outcome::PolicyRejected { policy, reason } => Some(GuardError::PolicyRejected {
                operation,
                policy,
                reason,
            }),
        }
    }
}

/// Per-invocation lifecycle.
///
/// `Pending -> RunningBefore -> (RejectedBefore | Executing)
///  -> (Success | Timeout | Failed) -> RunningAfter
///  -> (Success | Timeout | Failed | RejectedAfter) -> Done`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum InvocationState {
    Pending = 0,
    RunningBefore = 1,
    RejectedBefore = 2,
    Executing = 3,
    Success = 4,
    Timeout = 5,
    Failed = 6,
    RunningAfter = 7,
    RejectedAfter = 8,
    Done = 9,
}

impl InvocationState {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => InvocationState::Pending,
            1 => InvocationState::RunningBefore,
            2 => InvocationState::RejectedBefore,
            3 => InvocationState::Executing,
            4 => InvocationState::Success,
            5 => InvocationState::Timeout,
            6 => InvocationState::Failed,
            7 => InvocationState::RunningAfter,
            8 => InvocationState::RejectedAfter,
            9 => InvocationState::Done,
            _ => return None,
        })
    }

    pub fn is_terminal(self) -> bool {
        self == InvocationState::Done
    }

    /// State reached once the action produced `outcome`.
    pub fn settled(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Success => InvocationState::Success,
            Outcome::Timeout { .. } => InvocationState::Timeout,
            Outcome::AdapteeFailure(_) => InvocationState::Failed,
            Outcome::PolicyRejected { .. } => InvocationState::RejectedAfter,
        }
    }
}
