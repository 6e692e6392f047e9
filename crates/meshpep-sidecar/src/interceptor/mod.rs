//! Interceptor state machine shared by the egress and ingress filters.
//!
//! `Idle -> HeadersSeen -> AwaitingCallout -> {Resumed | Terminated}`.
//!
//! A [`Role`] supplies only decisions: what to do with the request headers
//! ([`Verdict`]) and what to do with a call result ([`Completion`]). The
//! [`Interceptor`] driver owns the [`RequestContext`], talks to the host, and
//! is the only code that dispatches, so a second dispatch per request cannot
//! be expressed.

mod context;
mod machine;

use meshpep_core::protocol::deny::DenyReason;

use crate::runtime::{CallOutcome, Callout, HeaderMutation, HostRuntime};

pub use context::{Phase, RequestContext};
pub use machine::{Interceptor, RoleFactory};

/// Decision taken on the request headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No interception needed.
    Pass,
    /// Suspend the request and dispatch this call.
    Callout(Callout),
    /// Terminate immediately without any call.
    Terminate(DenyReason),
}

/// Decision taken on a call result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Resume(Vec<HeaderMutation>),
    Terminate { reason: DenyReason, pdp_reason: String },
}

impl Completion {
    pub fn deny(reason: DenyReason) -> Self {
        Completion::Terminate {
            reason,
            pdp_reason: String::new(),
        }
    }
}

/// Role-specific behavior plugged into the shared state machine.
pub trait Role: Send + Sync + 'static {
    type Scratch: Default + Send + 'static;

    fn name(&self) -> &'static str;

    /// Inspect the request. The host is read-only here.
    fn on_headers(
        &self,
        host: &dyn HostRuntime,
        ctx: &mut RequestContext<Self::Scratch>,
    ) -> Verdict;

    /// Consume the result of the call dispatched for `ctx`. Also receives
    /// `CallOutcome::DispatchFailed` when the host refused the dispatch.
    fn on_outcome(
        &self,
        ctx: &mut RequestContext<Self::Scratch>,
        outcome: CallOutcome,
    ) -> Completion;
}
