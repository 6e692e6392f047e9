//! Policy Decision Service payloads.
//!
//! `POST /access/v2/evaluations {principal:{id}, queries:[{assetId, action}]}
//! -> {decisions:[{decision, reason}]}`. The enforcement point always sends a
//! single query and reads decisions positionally, first element only.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default evaluation path.
pub const EVALUATIONS_PATH: &str = "/access/v2/evaluations";

/// One (principal, resource, action) triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessQuery {
    pub principal: String,
    pub resource_id: String,
    pub action: String,
}

impl AccessQuery {
    /// Wire form: one principal, one query.
    pub fn to_request(&self) -> EvaluationRequest {
        EvaluationRequest {
            principal: PrincipalRef {
                id: self.principal.clone(),
            },
            queries: vec![Query {
                asset_id: self.resource_id.clone(),
                action: self.action.clone(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    #[serde(rename = "assetId")]
    pub asset_id: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub principal: PrincipalRef,
    pub queries: Vec<Query>,
}

/// Decision outcome. Any other string fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Allow,
    Deny,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Allow => "Allow",
            Outcome::Deny => "Deny",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub decision: Outcome,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub decisions: Vec<Decision>,
}

/// Why an evaluation response could not yield a decision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("unparseable evaluation response: {0}")]
    Malformed(String),
    #[error("empty decision batch")]
    Empty,
}

impl EvaluationResponse {
    /// Parse a response body and take its first decision.
    pub fn first_decision(body: &[u8]) -> Result<Decision, EvaluationError> {
        let resp: EvaluationResponse = serde_json::from_slice(body)
            .map_err(|e| EvaluationError::Malformed(e.to_string()))?;
        resp.decisions
            .into_iter()
            .next()
            .ok_or(EvaluationError::Empty)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn request_uses_asset_id_key() {
        let q = AccessQuery {
            principal: "service-a".into(),
            resource_id: "asset-x".into(),
            action: "call".into(),
        };
        let body = serde_json::to_string(&q.to_request()).unwrap();
        assert_eq!(
            body,
            r#"{"principal":{"id":"service-a"},"queries":[{"assetId":"asset-x","action":"call"}]}"#
        );
    }

    #[test]
    fn first_decision_only() {
        let d = EvaluationResponse::first_decision(
            br#"{"decisions":[{"decision":"Deny","reason":"no"},{"decision":"Allow","reason":"yes"}]}"#,
        )
        .unwrap();
        assert_eq!(d.decision, Outcome::Deny);
        assert_eq!(d.reason, "no");
    }

    #[test]
    fn empty_and_unknown_fail() {
        assert_eq!(
            EvaluationResponse::first_decision(br#"{"decisions":[]}"#),
            Err(EvaluationError::Empty)
        );
        assert!(matches!(
            EvaluationResponse::first_decision(br#"{"decisions":[{"decision":"Maybe","reason":""}]}"#),
            Err(EvaluationError::Malformed(_))
        ));
    }
}
