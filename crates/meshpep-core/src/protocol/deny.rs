//! Stable JSON envelope for synthesized terminations.
//!
//! Every termination carries `error` (human text) and `code` (stable,
//! machine-readable). Policy-class 403s add a nested `pdp_response` so callers
//! can tell a verdict from an evaluation failure by structure alone.

use serde_json::json;

/// Every reason an interceptor may terminate a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    MissingCredential,
    MalformedCredential,
    InvalidEncoding,
    MissingSubject,
    StaleCredential,
    UntrustedCredential,
    PolicyEvaluationFailed,
    AccessDenied,
    CredentialUnavailable,
}

impl DenyReason {
    /// HTTP status of the synthesized response.
    pub fn status(self) -> u16 {
        match self {
            DenyReason::MissingCredential
            | DenyReason::MalformedCredential
            | DenyReason::InvalidEncoding
            | DenyReason::MissingSubject
            | DenyReason::StaleCredential
            | DenyReason::UntrustedCredential => 401,
            DenyReason::PolicyEvaluationFailed | DenyReason::AccessDenied => 403,
            DenyReason::CredentialUnavailable => 503,
        }
    }

    /// Stable code for the `code` field.
    pub fn code(self) -> &'static str {
        match self {
            DenyReason::MissingCredential => "MISSING_CREDENTIAL",
            DenyReason::MalformedCredential => "MALFORMED_CREDENTIAL",
            DenyReason::InvalidEncoding => "INVALID_CREDENTIAL_ENCODING",
            DenyReason::MissingSubject => "MISSING_SUBJECT",
            DenyReason::StaleCredential => "STALE_CREDENTIAL",
            DenyReason::UntrustedCredential => "UNTRUSTED_CREDENTIAL",
            DenyReason::PolicyEvaluationFailed => "POLICY_EVALUATION_FAILED",
            DenyReason::AccessDenied => "ACCESS_DENIED",
            DenyReason::CredentialUnavailable => "CREDENTIAL_UNAVAILABLE",
        }
    }

    /// Human text for the `error` field.
    pub fn message(self) -> &'static str {
        match self {
            DenyReason::MissingCredential => "missing credential",
            DenyReason::MalformedCredential => "malformed credential",
            DenyReason::InvalidEncoding => "invalid credential encoding",
            DenyReason::MissingSubject => "credential missing subject",
            DenyReason::StaleCredential => "credential outside validity window",
            DenyReason::UntrustedCredential => "untrusted credential",
            DenyReason::PolicyEvaluationFailed => "policy evaluation failed",
            DenyReason::AccessDenied => "access denied by policy",
            DenyReason::CredentialUnavailable => "credential unavailable",
        }
    }

    /// Whether the body carries a `pdp_response` block.
    pub fn is_policy(self) -> bool {
        matches!(
            self,
            DenyReason::PolicyEvaluationFailed | DenyReason::AccessDenied
        )
    }
}

/// Render the envelope. `pdp_reason` is copied verbatim into
/// `pdp_response.reason` for policy-class reasons and ignored otherwise.
pub fn envelope(reason: DenyReason, pdp_reason: &str) -> String {
    let body = if reason.is_policy() {
        json!({
            "error": reason.message(),
            "code": reason.code(),
            "pdp_response": {
                "decision": "Deny",
                "reason": pdp_reason,
            }
        })
    } else {
        json!({
            "error": reason.message(),
            "code": reason.code(),
        })
    };
    body.to_string()
}
