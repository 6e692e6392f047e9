//! Ingress filter: validates the bearer credential structurally, asks the
//! policy decision service, and admits or terminates the request.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use meshpep_core::protocol::deny::DenyReason;
use meshpep_core::protocol::pdp::{AccessQuery, EvaluationResponse, Outcome};
use meshpep_core::protocol::token::{decode_claims, Claims};

use crate::config::{CalloutConfig, ClaimsConfig, IngressConfig, PrincipalSource};
use crate::interceptor::{Completion, RequestContext, Role, Verdict};
use crate::runtime::{CallOutcome, Callout, HeaderMutation, HostRuntime};

pub const DECISION_HEADER: &str = "X-PDP-Decision";
pub const REASON_HEADER: &str = "X-PDP-Reason";
pub const PRINCIPAL_HEADER: &str = "X-Principal-ID";

#[derive(Debug, Default)]
pub struct IngressScratch {
    pub principal: String,
    pub resource_id: String,
    pub action: String,
}

#[derive(Debug)]
pub struct IngressRole {
    principal_source: PrincipalSource,
    identity_header: String,
    resource_param: String,
    default_resource: String,
    action: String,
    pdp: CalloutConfig,
    claims: ClaimsConfig,
}

impl IngressRole {
    pub fn new(cfg: &IngressConfig) -> Self {
        Self {
            principal_source: cfg.principal_source,
            identity_header: cfg.identity_header.clone(),
            resource_param: cfg.resource_param.clone(),
            default_resource: cfg.default_resource.clone(),
            action: cfg.action.clone(),
            pdp: cfg.pdp.clone(),
            claims: cfg.claims.clone(),
        }
    }

    fn check_claims(&self, claims: &Claims) -> Result<(), DenyReason> {
        if self.claims.enforce_time {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            claims
                .check_time(now, self.claims.leeway_secs)
                .map_err(|_| DenyReason::StaleCredential)?;
        }
        if let Some(iss) = &self.claims.issuer {
            claims.check_issuer(iss).map_err(|_| DenyReason::UntrustedCredential)?;
        }
        if let Some(aud) = &self.claims.audience {
            claims.check_audience(aud).map_err(|_| DenyReason::UntrustedCredential)?;
        }
        Ok(())
    }

    fn principal(&self, host: &dyn HostRuntime, claims: &Claims) -> Result<String, DenyReason> {
        if self.principal_source == PrincipalSource::IdentityHeader {
            if let Some(id) = host.request_header(&self.identity_header).filter(|v| !v.is_empty()) {
                tracing::warn!(
                    header = %self.identity_header,
                    principal = %id,
                    "principal taken from caller-supplied header; not a trust boundary"
                );
                return Ok(id);
            }
        }
        claims
            .subject()
            .map(str::to_string)
            .map_err(|_| DenyReason::MissingSubject)
    }

    fn resource(&self, path: &str) -> String {
        path.split_once('?')
            .and_then(|(_, query)| query_param(query, &self.resource_param))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.default_resource.clone())
    }

    fn evaluate(&self, ctx: &RequestContext<IngressScratch>) -> Option<Callout> {
        let s = ctx.scratch();
        let query = AccessQuery {
            principal: s.principal.clone(),
            resource_id: s.resource_id.clone(),
            action: s.action.clone(),
        };
        let body = serde_json::to_vec(&query.to_request()).ok()?;
        Some(Callout {
            cluster: self.pdp.cluster.clone(),
            method: "POST".into(),
            path: self.pdp.path.clone(),
            authority: self.pdp.authority.clone(),
            content_type: "application/json".into(),
            body: Bytes::from(body),
            timeout_ms: self.pdp.timeout_ms,
        })
    }

    fn evaluation_failed(&self, ctx: &RequestContext<IngressScratch>, why: &str) -> Completion {
        tracing::warn!(
            ctx = ctx.id(),
            cluster = %self.pdp.cluster,
            principal = %ctx.scratch().principal,
            resource = %ctx.scratch().resource_id,
            reason = why,
            "policy evaluation failed"
        );
        Completion::deny(DenyReason::PolicyEvaluationFailed)
    }
}

/// Value of `key` in a raw query string. Exact key match, no decoding.
fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

/// `value` with control characters replaced by spaces, so it always forms a
/// valid header value.
fn header_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() && c != '\t' { ' ' } else { c })
        .collect()
}

/// Token from an `Authorization` value of the form `Bearer <token>`.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

impl Role for IngressRole {
    type Scratch = IngressScratch;

    fn name(&self) -> &'static str {
        "ingress"
    }

    fn on_headers(
        &self,
        host: &dyn HostRuntime,
        ctx: &mut RequestContext<IngressScratch>,
    ) -> Verdict {
        let path = host.request_header(":path").unwrap_or_else(|| "/".to_string());
        ctx.set_target(path.split_once('?').map_or(path.as_str(), |(p, _)| p));

        let authorization = match host.request_header("authorization") {
            Some(v) if !v.trim().is_empty() => v,
            _ => return Verdict::Terminate(DenyReason::MissingCredential),
        };
        let Some(token) = bearer_token(&authorization) else {
            return Verdict::Terminate(DenyReason::MalformedCredential);
        };
        let claims = match decode_claims(token) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(
                    ctx = ctx.id(),
                    token_len = token.len(),
                    error = %e,
                    "credential not decodable"
                );
                return Verdict::Terminate(DenyReason::InvalidEncoding);
            }
        };
        if let Err(reason) = self.check_claims(&claims) {
            return Verdict::Terminate(reason);
        }
        let principal = match self.principal(host, &claims) {
            Ok(p) => p,
            Err(reason) => return Verdict::Terminate(reason),
        };

        let resource_id = self.resource(&path);
        tracing::debug!(
            ctx = ctx.id(),
            %principal,
            resource = %resource_id,
            action = %self.action,
            "evaluating access"
        );
        *ctx.scratch_mut() = IngressScratch {
            principal,
            resource_id,
            action: self.action.clone(),
        };

        match self.evaluate(ctx) {
            Some(call) => Verdict::Callout(call),
            None => Verdict::Terminate(DenyReason::PolicyEvaluationFailed),
        }
    }

    fn on_outcome(
        &self,
        ctx: &mut RequestContext<IngressScratch>,
        outcome: CallOutcome,
    ) -> Completion {
        let body = match outcome {
            CallOutcome::Response { status, body, .. } if (200..300).contains(&status) => body,
            CallOutcome::Response { status, .. } => {
                return self.evaluation_failed(ctx, &format!("pdp returned status {status}"));
            }
            CallOutcome::TransportFailure(e) => return self.evaluation_failed(ctx, &e),
            CallOutcome::TimedOut => return self.evaluation_failed(ctx, "timed out"),
            CallOutcome::DispatchFailed(e) => return self.evaluation_failed(ctx, &e.to_string()),
        };

        let decision = match EvaluationResponse::first_decision(&body) {
            Ok(d) => d,
            Err(e) => return self.evaluation_failed(ctx, &e.to_string()),
        };

        let s = ctx.scratch();
        tracing::info!(
            ctx = ctx.id(),
            principal = %s.principal,
            resource = %s.resource_id,
            decision = decision.decision.as_str(),
            reason = %decision.reason,
            "policy decision"
        );
        // Set, not add: caller-supplied copies must not reach the callee.
        match decision.decision {
            Outcome::Allow => Completion::Resume(vec![
                HeaderMutation::set(DECISION_HEADER, Outcome::Allow.as_str()),
                HeaderMutation::set(REASON_HEADER, header_safe(&decision.reason)),
                HeaderMutation::set(PRINCIPAL_HEADER, header_safe(&s.principal)),
            ]),
            Outcome::Deny => Completion::Terminate {
                reason: DenyReason::AccessDenied,
                pdp_reason: decision.reason,
            },
        }
    }
}
