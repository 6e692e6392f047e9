//! Top-level facade crate for meshpep.
//!
//! Re-exports core types and the sidecar library so users can depend on a single crate.

pub mod core {
    pub use meshpep_core::*;
}

pub mod sidecar {
    pub use meshpep_sidecar::*;
}
