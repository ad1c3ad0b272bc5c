//! coproguard core: runtime-free contracts shared by the guard executor,
//! its policies and the hosts that embed them.
//!
//! This crate defines the outcome classification and the error surface a
//! guarded plugin call can produce. It intentionally carries no async runtime
//! so policy authors can depend on it without pulling tokio in.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod outcome;

pub use error::{
    AdapteeCause, ErrorKind, GuardError, PanicCause, PluginError, PluginResult, PolicyError, Result,
};
pub use outcome::{InvocationState, Outcome, OutcomeKind};
