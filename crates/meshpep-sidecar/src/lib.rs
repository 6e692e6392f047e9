//! meshpep sidecar library entry.
//!
//! Wires the interceptor runtime contract, the shared state machine, the
//! egress and ingress filters, and a reference reverse-proxy host. Consumed
//! by the binary (`main.rs`) and by integration tests.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod app_state;
pub mod config;
pub mod filters;
pub mod host;
pub mod interceptor;
pub mod obs;
pub mod ops;
pub mod router;
pub mod runtime;
