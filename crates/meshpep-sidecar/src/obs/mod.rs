//! Observability: in-process metrics rendered by the admin `/metrics` handler.

pub mod metrics;
