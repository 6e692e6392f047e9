//! Axum router wiring.
//!
//! The proxy router sends every request through the filter; the admin router
//! serves the ops endpoints on a separate listener.

use axum::{routing::get, Router};

use crate::{app_state::SidecarState, host::proxy, ops};

pub fn build_router(state: SidecarState) -> Router {
    Router::new().fallback(proxy::proxy).with_state(state)
}

pub fn build_admin_router(state: SidecarState) -> Router {
    Router::new()
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics))
        .with_state(state)
}
