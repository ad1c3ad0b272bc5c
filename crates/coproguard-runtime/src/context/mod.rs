//! Invocation context shared across one policy chain run.

pub mod invocation;

pub use invocation::{Environment, InvocationContext, NoEnvironment};
