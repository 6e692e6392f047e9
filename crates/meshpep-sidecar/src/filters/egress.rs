//! Egress filter: obtains a credential from the issuer and injects it into
//! outbound calls to configured targets.

use bytes::Bytes;
use meshpep_core::error::{PepError, Result};
use meshpep_core::protocol::deny::DenyReason;
use meshpep_core::protocol::issuer::{TokenRequest, TokenResponse};

use crate::config::{CalloutConfig, EgressConfig, IssuanceFailure};
use crate::interceptor::{Completion, RequestContext, Role, Verdict};
use crate::runtime::{CallOutcome, Callout, HeaderMutation, HostRuntime};

use super::targets::{compile_targets, is_target, TargetRule};

#[derive(Debug)]
pub struct EgressRole {
    service_id: String,
    targets: Vec<TargetRule>,
    destination_header: String,
    issuer: CalloutConfig,
    issuance_failure: IssuanceFailure,
}

impl EgressRole {
    pub fn new(cfg: &EgressConfig) -> Result<Self> {
        Ok(Self {
            service_id: cfg.service_id.clone(),
            targets: compile_targets(&cfg.targets)?,
            destination_header: cfg.destination_header.clone(),
            issuer: cfg.issuer.clone(),
            issuance_failure: cfg.issuance_failure,
        })
    }

    fn token_request(&self) -> Result<Callout> {
        let body = serde_json::to_vec(&TokenRequest {
            service_id: self.service_id.clone(),
        })
        .map_err(|e| PepError::Internal(format!("encode token request: {e}")))?;
        Ok(Callout {
            cluster: self.issuer.cluster.clone(),
            method: "POST".into(),
            path: self.issuer.path.clone(),
            authority: self.issuer.authority.clone(),
            content_type: "application/json".into(),
            body: Bytes::from(body),
            timeout_ms: self.issuer.timeout_ms,
        })
    }

    fn issuance_failed(&self, ctx: &RequestContext<()>, why: &str) -> Completion {
        tracing::warn!(
            ctx = ctx.id(),
            destination = ctx.target().unwrap_or_default(),
            cluster = %self.issuer.cluster,
            reason = why,
            mode = ?self.issuance_failure,
            "credential issuance failed"
        );
        match self.issuance_failure {
            IssuanceFailure::FailOpen => Completion::Resume(Vec::new()),
            IssuanceFailure::FailClosed => Completion::deny(DenyReason::CredentialUnavailable),
        }
    }
}

impl Role for EgressRole {
    type Scratch = ();

    fn name(&self) -> &'static str {
        "egress"
    }

    fn on_headers(&self, host: &dyn HostRuntime, ctx: &mut RequestContext<()>) -> Verdict {
        let Some(destination) = host.request_header(&self.destination_header) else {
            return Verdict::Pass;
        };
        if !is_target(&self.targets, &destination) {
            return Verdict::Pass;
        }
        ctx.set_target(destination);

        match self.token_request() {
            Ok(call) => Verdict::Callout(call),
            Err(e) => match self.issuance_failed(ctx, &e.to_string()) {
                Completion::Terminate { reason, .. } => Verdict::Terminate(reason),
                Completion::Resume(_) => Verdict::Pass,
            },
        }
    }

    fn on_outcome(&self, ctx: &mut RequestContext<()>, outcome: CallOutcome) -> Completion {
        let body = match outcome {
            CallOutcome::Response { status, body, .. } if (200..300).contains(&status) => body,
            CallOutcome::Response { status, .. } => {
                return self.issuance_failed(ctx, &format!("issuer returned status {status}"));
            }
            CallOutcome::TransportFailure(e) => return self.issuance_failed(ctx, &e),
            CallOutcome::TimedOut => return self.issuance_failed(ctx, "timed out"),
            CallOutcome::DispatchFailed(e) => return self.issuance_failed(ctx, &e.to_string()),
        };

        let Some(resp) = TokenResponse::usable(&body) else {
            return self.issuance_failed(ctx, "no usable token in issuer response");
        };
        tracing::debug!(
            ctx = ctx.id(),
            destination = ctx.target().unwrap_or_default(),
            token_len = resp.token.len(),
            expires_in = resp.expires_in,
            "credential attached"
        );
        let header = format!("Bearer {}", resp.token);
        Completion::Resume(vec![HeaderMutation::set("Authorization", header)])
    }
}
