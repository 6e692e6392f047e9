//! Interceptor runtime contract.
//!
//! The hosting data plane supplies header accessors, a non-blocking
//! dispatch-and-callback primitive for out-of-band calls, and
//! pause/resume/terminate primitives for the intercepted request. Filters are
//! written only against these traits, so the same interceptor runs inside the
//! reference sidecar host and inside tests.
//!
//! Call flow for one request:
//! 1. host creates a filter via [`FilterFactory::create`]
//! 2. host delivers headers: [`HttpFilter::on_request_headers`]
//! 3. if the filter dispatched, the host executes the call, enforces the
//!    per-call deadline, checks the correlation id, and delivers exactly one
//!    [`HttpFilter::on_call_result`]
//! 4. the filter either resumed the request or sent a synthetic response

pub mod stream;

use std::fmt;

use bytes::Bytes;
use meshpep_core::protocol::deny::{self, DenyReason};
use thiserror::Error;

pub use stream::HostStream;

/// Correlation id of one outstanding out-of-band call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallId(pub u32);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Out-of-band call description handed to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callout {
    /// Logical cluster name; the host resolves it to an address.
    pub cluster: String,
    pub method: String,
    pub path: String,
    pub authority: String,
    pub content_type: String,
    pub body: Bytes,
    /// Per-call deadline enforced by the host.
    pub timeout_ms: u64,
}

/// Why the host refused to accept a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("unknown cluster: {0}")]
    UnknownCluster(String),
    #[error("a call is already outstanding for this request")]
    Busy,
    #[error("host refused dispatch: {0}")]
    Refused(String),
}

/// Result of an accepted (or refused) dispatch, as seen by the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Response {
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
    },
    TransportFailure(String),
    TimedOut,
    /// Synchronous refusal; never delivered through the host callback.
    DispatchFailed(DispatchError),
}

impl CallOutcome {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            CallOutcome::Response { status, .. } if (200..300).contains(status) => "ok",
            CallOutcome::Response { .. } => "http_error",
            CallOutcome::TransportFailure(_) => "transport_failure",
            CallOutcome::TimedOut => "timeout",
            CallOutcome::DispatchFailed(_) => "dispatch_failed",
        }
    }
}

/// Response synthesized by a filter to terminate the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Denial category, when the response is a denial envelope.
    pub reason: Option<DenyReason>,
}

impl SyntheticResponse {
    /// JSON denial envelope for `reason`.
    pub fn deny(reason: DenyReason, pdp_reason: &str) -> Self {
        Self {
            status: reason.status(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Bytes::from(deny::envelope(reason, pdp_reason)),
            reason: Some(reason),
        }
    }
}

/// What the host should do with the request after a header event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    Continue,
    Pause,
}

/// A request header change applied on completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderMutation {
    Set { name: String, value: String },
    Add { name: String, value: String },
}

impl HeaderMutation {
    pub fn set(name: &str, value: impl Into<String>) -> Self {
        HeaderMutation::Set {
            name: name.to_string(),
            value: value.into(),
        }
    }

    pub fn add(name: &str, value: impl Into<String>) -> Self {
        HeaderMutation::Add {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// Primitives the host exposes to a filter for the request it is handling.
pub trait HostRuntime {
    /// First value of `name` (case-insensitive). Pseudo headers `:authority`,
    /// `:path`, and `:method` are available.
    fn request_header(&self, name: &str) -> Option<String>;
    fn set_request_header(&mut self, name: &str, value: &str);
    fn add_request_header(&mut self, name: &str, value: &str);
    /// Enqueue an out-of-band call. Never blocks; the result arrives later
    /// through [`HttpFilter::on_call_result`].
    fn dispatch_call(&mut self, call: Callout) -> Result<CallId, DispatchError>;
    /// Terminate the request with `response`.
    fn send_synthetic_response(&mut self, response: SyntheticResponse);
    /// Let a paused request continue.
    fn resume_request(&mut self);
}

/// Per-request filter driven by the host.
pub trait HttpFilter: Send {
    fn on_request_headers(&mut self, host: &mut dyn HostRuntime) -> FilterAction;
    fn on_call_result(
        &mut self,
        host: &mut dyn HostRuntime,
        call_id: CallId,
        outcome: CallOutcome,
    );
    /// Host tore the request down before it reached a terminal state.
    fn on_teardown(&mut self) {}
}

/// Creates one filter per intercepted request.
pub trait FilterFactory: Send + Sync {
    fn role(&self) -> &'static str;
    fn create(&self, context_id: u64) -> Box<dyn HttpFilter>;
}
