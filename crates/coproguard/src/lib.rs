//! Top-level facade crate for coproguard.
//!
//! Re-exports the core contracts and the guard runtime so hosts can depend on a single crate.

pub mod core {
    pub use coproguard_core::*;
}

pub mod runtime {
    pub use coproguard_runtime::*;
}
