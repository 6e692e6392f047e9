#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use serde_json::{json, Value};

use meshpep_sidecar::config::{self, SidecarConfig};
use meshpep_sidecar::filters;
use meshpep_sidecar::runtime::{CallOutcome, HostStream, HttpFilter};

pub const EGRESS_YAML: &str = r#"
version: 1
sidecar:
  upstream: "http://127.0.0.1:8083"
  clusters:
    jwt-vending-service: "http://jwt-vending-service:8081"
role: egress
egress:
  service_id: service-a
  targets: ["service-b", "envoy-service-b:10001", "service-c:*"]
"#;

pub const INGRESS_YAML: &str = r#"
version: 1
sidecar:
  upstream: "http://127.0.0.1:8083"
  clusters:
    sgnl-pdp-service: "http://sgnl-pdp-service:8082"
role: ingress
ingress: {}
"#;

pub fn cfg(yaml: &str) -> SidecarConfig {
    config::load_from_str(yaml).unwrap()
}

/// Filter for the role in `yaml`.
pub fn filter(yaml: &str) -> Box<dyn HttpFilter> {
    filters::build_factory(&cfg(yaml)).unwrap().create(1)
}

/// Unsigned three-segment token carrying `claims`.
pub fn token(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

pub fn token_for(sub: &str) -> String {
    token(json!({ "sub": sub, "iss": "jwt-vending-service", "iat": 1_700_000_000u64 }))
}

pub fn response(status: u16, body: &str) -> CallOutcome {
    CallOutcome::Response {
        status,
        headers: vec![("content-type".into(), "application/json".into())],
        body: Bytes::from(body.to_string()),
    }
}

pub fn issued(token: &str) -> CallOutcome {
    response(200, &json!({ "token": token, "expires_in": 3600 }).to_string())
}

pub fn decision(decision: &str, reason: &str) -> CallOutcome {
    response(
        200,
        &json!({ "decisions": [{ "decision": decision, "reason": reason }] }).to_string(),
    )
}

/// Body of the synthetic response as JSON.
pub fn deny_body(stream: &HostStream) -> Value {
    serde_json::from_slice(&stream.response().unwrap().body).unwrap()
}
