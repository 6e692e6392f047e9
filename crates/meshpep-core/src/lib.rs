//! meshpep core: transport-agnostic wire types, credential decoding, and errors.
//!
//! This crate defines the contracts shared by the egress and ingress
//! interceptors: the Credential Issuer and Policy Decision Service payloads,
//! the structural token decoder, and the stable JSON envelope used for every
//! synthesized denial. It carries no runtime or transport dependencies so the
//! same types can back a proxy filter, a test harness, or a client SDK.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Hostile credentials and malformed collaborator responses must surface as
//! `PepError`/`TokenError` values, never as a crashed worker.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{PepError, Result};
