//! Per-request context and the phase it is in.

use crate::runtime::CallId;

/// Interceptor phase. `Resumed` and `Terminated` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    HeadersSeen,
    /// The only place a correlation id is held, so at most one call can be
    /// outstanding per request.
    AwaitingCallout(CallId),
    Resumed,
    Terminated,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Resumed | Phase::Terminated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::HeadersSeen => "headers_seen",
            Phase::AwaitingCallout(_) => "awaiting_callout",
            Phase::Resumed => "resumed",
            Phase::Terminated => "terminated",
        }
    }
}

/// State for one intercepted request, exclusively owned by its interceptor.
///
/// Roles may read the phase and fill in the target and their scratch fields;
/// only the state machine in this module tree can move the phase.
#[derive(Debug)]
pub struct RequestContext<S> {
    id: u64,
    phase: Phase,
    target: Option<String>,
    scratch: S,
}

impl<S: Default> RequestContext<S> {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            phase: Phase::Idle,
            target: None,
            scratch: S::default(),
        }
    }
}

impl<S> RequestContext<S> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Correlation id of the outstanding call, if any.
    pub fn call_id(&self) -> Option<CallId> {
        match self.phase {
            Phase::AwaitingCallout(id) => Some(id),
            _ => None,
        }
    }

    /// Destination authority (egress) or request path (ingress).
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn set_target(&mut self, target: impl Into<String>) {
        self.target = Some(target.into());
    }

    pub fn scratch(&self) -> &S {
        &self.scratch
    }

    pub fn scratch_mut(&mut self) -> &mut S {
        &mut self.scratch
    }

    /// Move to `next` if the transition is legal. Illegal transitions leave
    /// the phase untouched and return false.
    pub(super) fn advance(&mut self, next: Phase) -> bool {
        let ok = match (self.phase, next) {
            (Phase::Idle, Phase::HeadersSeen) => true,
            (Phase::HeadersSeen, Phase::AwaitingCallout(_)) => true,
            (Phase::HeadersSeen | Phase::AwaitingCallout(_), Phase::Resumed) => true,
            // Also covers host teardown from Idle.
            (from, Phase::Terminated) => !from.is_terminal(),
            _ => false,
        };
        if ok {
            self.phase = next;
        }
        ok
    }
}
