//! coproguard runtime library entry.
//!
//! This crate wires the policy chain executor, the concrete policies, the
//! metrics registry and the coprocessor facade into one guard stack. It is
//! consumed by the host binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod context;
pub mod coprocessor;
pub mod executor;
pub mod obs;
pub mod ops;
pub mod policy;
pub mod router;
pub mod services;

pub use context::{Environment, InvocationContext};
pub use executor::PolicyVerifierAdapter;
pub use policy::{Policy, PolicyChain};
