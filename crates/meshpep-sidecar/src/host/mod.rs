//! Reference data-plane host: an axum reverse proxy that drives one filter
//! per request through a [`crate::runtime::HostStream`].

pub mod backend;
pub mod proxy;

pub use backend::{ForwardRequest, HttpBackend, ReqwestBackend, UpstreamResponse};
