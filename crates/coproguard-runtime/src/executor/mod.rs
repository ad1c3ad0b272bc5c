//! Policy chain executor.
//!
//! Every intercepted plugin method funnels through
//! [`PolicyVerifierAdapter::run_with_policies`], the single translation
//! boundary between plugin code and the host.

pub mod verifier;

pub use verifier::{PolicyVerifierAdapter, PolicyVerifierBuilder, EXECUTOR_POLICY};
