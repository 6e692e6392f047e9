use std::sync::Arc;

use crate::runtime::{
    CallId, CallOutcome, FilterAction, FilterFactory, HeaderMutation, HostRuntime, HttpFilter,
    SyntheticResponse,
};

use super::{Completion, Phase, RequestContext, Role, Verdict};

/// Drives one request through the shared phases for role `R`.
pub struct Interceptor<R: Role> {
    role: Arc<R>,
    ctx: RequestContext<R::Scratch>,
}

impl<R: Role> Interceptor<R> {
    pub fn new(context_id: u64, role: Arc<R>) -> Self {
        Self {
            role,
            ctx: RequestContext::new(context_id),
        }
    }

    pub fn context(&self) -> &RequestContext<R::Scratch> {
        &self.ctx
    }

    /// Apply a completion. `suspended` tells whether the host is holding the
    /// request and must be told to resume it.
    fn complete(
        &mut self,
        host: &mut dyn HostRuntime,
        completion: Completion,
        suspended: bool,
    ) -> FilterAction {
        match completion {
            Completion::Resume(mutations) => {
                for m in &mutations {
                    match m {
                        HeaderMutation::Set { name, value } => host.set_request_header(name, value),
                        HeaderMutation::Add { name, value } => host.add_request_header(name, value),
                    }
                }
                self.ctx.advance(Phase::Resumed);
                if suspended {
                    host.resume_request();
                }
                FilterAction::Continue
            }
            Completion::Terminate { reason, pdp_reason } => {
                tracing::info!(
                    ctx = self.ctx.id(),
                    role = self.role.name(),
                    status = reason.status(),
                    code = reason.code(),
                    "terminating request"
                );
                host.send_synthetic_response(SyntheticResponse::deny(reason, &pdp_reason));
                self.ctx.advance(Phase::Terminated);
                FilterAction::Pause
            }
        }
    }
}

impl<R: Role> HttpFilter for Interceptor<R> {
    fn on_request_headers(&mut self, host: &mut dyn HostRuntime) -> FilterAction {
        if !self.ctx.advance(Phase::HeadersSeen) {
            tracing::warn!(
                ctx = self.ctx.id(),
                phase = self.ctx.phase().as_str(),
                "headers delivered twice; ignored"
            );
            return match self.ctx.phase() {
                Phase::Resumed => FilterAction::Continue,
                _ => FilterAction::Pause,
            };
        }

        match self.role.on_headers(&*host, &mut self.ctx) {
            Verdict::Pass => {
                self.ctx.advance(Phase::Resumed);
                FilterAction::Continue
            }
            Verdict::Terminate(reason) => self.complete(host, Completion::deny(reason), false),
            Verdict::Callout(callout) => {
                let cluster = callout.cluster.clone();
                match host.dispatch_call(callout) {
                    Ok(call_id) => {
                        self.ctx.advance(Phase::AwaitingCallout(call_id));
                        tracing::debug!(
                            ctx = self.ctx.id(),
                            call_id = %call_id,
                            %cluster,
                            "callout dispatched; request paused"
                        );
                        FilterAction::Pause
                    }
                    Err(err) => {
                        tracing::warn!(
                            ctx = self.ctx.id(),
                            %cluster,
                            error = %err,
                            "callout dispatch refused"
                        );
                        let completion = self
                            .role
                            .on_outcome(&mut self.ctx, CallOutcome::DispatchFailed(err));
                        self.complete(host, completion, false)
                    }
                }
            }
        }
    }

    fn on_call_result(
        &mut self,
        host: &mut dyn HostRuntime,
        call_id: CallId,
        outcome: CallOutcome,
    ) {
        if self.ctx.call_id() != Some(call_id) {
            tracing::debug!(
                ctx = self.ctx.id(),
                call_id = %call_id,
                phase = self.ctx.phase().as_str(),
                "stale call result dropped"
            );
            return;
        }
        tracing::debug!(
            ctx = self.ctx.id(),
            call_id = %call_id,
            outcome = outcome.label(),
            "call result"
        );
        let completion = self.role.on_outcome(&mut self.ctx, outcome);
        self.complete(host, completion, true);
    }

    fn on_teardown(&mut self) {
        if self.ctx.advance(Phase::Terminated) {
            tracing::debug!(ctx = self.ctx.id(), "context torn down by host");
        }
    }
}

/// [`FilterFactory`] creating an [`Interceptor`] per request for a shared role.
pub struct RoleFactory<R: Role> {
    role: Arc<R>,
}

impl<R: Role> RoleFactory<R> {
    pub fn new(role: R) -> Self {
        Self { role: Arc::new(role) }
    }
}

impl<R: Role> FilterFactory for RoleFactory<R> {
    fn role(&self) -> &'static str {
        self.role.name()
    }

    fn create(&self, context_id: u64) -> Box<dyn HttpFilter> {
        Box::new(Interceptor::new(context_id, Arc::clone(&self.role)))
    }
}
