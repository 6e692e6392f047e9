#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{self, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::Value;

use common::{cfg, decision, issued, token_for, EGRESS_YAML, INGRESS_YAML};
use meshpep_core::error::Result;
use meshpep_sidecar::app_state::SidecarState;
use meshpep_sidecar::host::{proxy, ForwardRequest, HttpBackend, UpstreamResponse};
use meshpep_sidecar::ops;
use meshpep_sidecar::runtime::{CallOutcome, Callout};

/// Backend that answers every callout with a fixed outcome after `delay`.
struct FakeBackend {
    outcome: CallOutcome,
    delay: Duration,
    calls: AtomicUsize,
    forwarded: Mutex<Vec<ForwardRequest>>,
}

impl FakeBackend {
    fn new(outcome: CallOutcome) -> Arc<Self> {
        Self::slow(outcome, Duration::ZERO)
    }

    fn slow(outcome: CallOutcome, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            delay,
            calls: AtomicUsize::new(0),
            forwarded: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn forwarded(&self) -> Vec<ForwardRequest> {
        self.forwarded.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpBackend for FakeBackend {
    async fn call(&self, _callout: &Callout) -> CallOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcome.clone()
    }

    async fn forward(&self, req: ForwardRequest) -> Result<UpstreamResponse> {
        self.forwarded.lock().unwrap().push(req);
        Ok(UpstreamResponse {
            status: 200,
            headers: vec![("content-type".into(), "text/plain".into())],
            body: Bytes::from_static(b"downstream ok"),
        })
    }
}

fn state(yaml: &str, backend: Arc<FakeBackend>) -> SidecarState {
    SidecarState::with_backend(cfg(yaml), backend).unwrap()
}

fn request(uri: &str, host: &str, authorization: Option<&str>) -> Request {
    let mut b = axum::http::Request::builder().uri(uri).header("host", host);
    if let Some(a) = authorization {
        b = b.header("authorization", a);
    }
    b.body(Body::empty()).unwrap()
}

async fn body_of(resp: Response) -> Bytes {
    body::to_bytes(resp.into_body(), usize::MAX).await.unwrap()
}

fn header<'a>(req: &'a ForwardRequest, name: &str) -> Vec<&'a str> {
    req.headers
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
        .collect()
}

#[tokio::test]
async fn ingress_allow_reaches_downstream() {
    let backend = FakeBackend::new(decision("Allow", "ok"));
    let st = state(INGRESS_YAML, backend.clone());
    let bearer = format!("Bearer {}", token_for("service-a"));

    let req = request("/hello?asset=asset-x", "envoy-service-b:10001", Some(&bearer));
    let resp = proxy::handle(&st, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_of(resp).await, Bytes::from_static(b"downstream ok"));

    let fwd = backend.forwarded();
    assert_eq!(fwd.len(), 1);
    assert_eq!(fwd[0].path, "/hello?asset=asset-x");
    assert_eq!(header(&fwd[0], "x-pdp-decision"), vec!["Allow"]);
    assert_eq!(header(&fwd[0], "x-principal-id"), vec!["service-a"]);
    assert_eq!(header(&fwd[0], "authorization"), vec![bearer.as_str()]);
    assert!(fwd[0].headers.iter().all(|(k, _)| !k.starts_with(':')));

    let m = st.metrics();
    assert_eq!(m.requests.get(&[("role", "ingress"), ("outcome", "resumed")]), 1);
    assert_eq!(m.callouts.get(&[("cluster", "sgnl-pdp-service"), ("result", "ok")]), 1);
    assert_eq!(m.requests_inflight.get(&[("role", "ingress")]), 0);
}

#[tokio::test]
async fn ingress_deny_forwards_nothing() {
    let reason = "Principal service-a is not allowed to access asset-y";
    let backend = FakeBackend::new(decision("Deny", reason));
    let st = state(INGRESS_YAML, backend.clone());
    let bearer = format!("Bearer {}", token_for("service-a"));

    let req = request("/hello?asset=asset-y", "envoy-service-b:10001", Some(&bearer));
    let resp = proxy::handle(&st, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(resp.headers()["content-type"], "application/json");
    let body: Value = serde_json::from_slice(&body_of(resp).await).unwrap();
    assert_eq!(body["pdp_response"]["reason"], reason);
    assert!(backend.forwarded().is_empty());
    assert_eq!(
        st.metrics().denials.get(&[("role", "ingress"), ("code", "ACCESS_DENIED")]),
        1
    );
}

#[tokio::test]
async fn ingress_pdp_timeout_is_policy_evaluation_failed() {
    let yaml = format!(
        "{}  pdp: {{ cluster: sgnl-pdp-service, authority: sgnl-pdp-service:8082, \
         path: /access/v2/evaluations, timeout_ms: 20 }}\n",
        INGRESS_YAML.replace("ingress: {}", "ingress:")
    );
    // would have allowed, but too late
    let backend = FakeBackend::slow(decision("Allow", "late"), Duration::from_millis(500));
    let st = state(&yaml, backend.clone());
    let bearer = format!("Bearer {}", token_for("service-a"));

    let resp = proxy::handle(&st, request("/hello?asset=asset-x", "b", Some(&bearer))).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = serde_json::from_slice(&body_of(resp).await).unwrap();
    assert_eq!(body["error"], "policy evaluation failed");
    assert!(backend.forwarded().is_empty());
    assert_eq!(
        st.metrics().callouts.get(&[("cluster", "sgnl-pdp-service"), ("result", "timeout")]),
        1
    );
}

#[tokio::test]
async fn ingress_missing_token_never_calls_pdp() {
    let backend = FakeBackend::new(decision("Allow", "ok"));
    let st = state(INGRESS_YAML, backend.clone());

    let resp = proxy::handle(&st, request("/hello", "b", None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(backend.calls(), 0);
    assert!(backend.forwarded().is_empty());
}

#[tokio::test]
async fn ingress_undecodable_token_never_calls_pdp() {
    let backend = FakeBackend::new(decision("Allow", "ok"));
    let st = state(INGRESS_YAML, backend.clone());

    let resp = proxy::handle(&st, request("/hello", "b", Some("Bearer aaa.%%%.ccc"))).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn ingress_non_utf8_authorization_is_not_treated_as_missing() {
    let backend = FakeBackend::new(decision("Allow", "ok"));
    let st = state(INGRESS_YAML, backend.clone());
    let req = axum::http::Request::builder()
        .uri("/hello")
        .header("host", "b")
        .header("authorization", HeaderValue::from_bytes(b"Bearer \xff\xfe").unwrap())
        .body(Body::empty())
        .unwrap();

    let resp = proxy::handle(&st, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = serde_json::from_slice(&body_of(resp).await).unwrap();
    assert_ne!(body["code"], "MISSING_CREDENTIAL");
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn ingress_denies_before_reading_oversized_body() {
    let backend = FakeBackend::new(decision("Allow", "ok"));
    let st = state(INGRESS_YAML, backend.clone());
    let req = axum::http::Request::builder()
        .uri("/upload")
        .header("host", "b")
        .body(Body::from(vec![0u8; 5 * 1024 * 1024]))
        .unwrap();

    let resp = proxy::handle(&st, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        st.metrics().denials.get(&[("role", "ingress"), ("code", "MISSING_CREDENTIAL")]),
        1
    );
}

#[tokio::test]
async fn egress_injects_credential_for_target() {
    let backend = FakeBackend::new(issued("T"));
    let st = state(EGRESS_YAML, backend.clone());

    let resp = proxy::handle(&st, request("/hello", "envoy-service-b:10001", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let fwd = backend.forwarded();
    assert_eq!(header(&fwd[0], "authorization"), vec!["Bearer T"]);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn egress_non_target_is_pure_pass_through() {
    let backend = FakeBackend::new(issued("T"));
    let st = state(EGRESS_YAML, backend.clone());

    let resp = proxy::handle(&st, request("/hello", "service-z:80", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(backend.calls(), 0);
    assert!(header(&backend.forwarded()[0], "authorization").is_empty());
    assert_eq!(st.metrics().requests.get(&[("role", "egress"), ("outcome", "passed")]), 1);
}

#[tokio::test]
async fn egress_issuer_down_fails_open() {
    let backend = FakeBackend::new(CallOutcome::TransportFailure("connection refused".into()));
    let st = state(EGRESS_YAML, backend.clone());

    let resp = proxy::handle(&st, request("/hello", "service-b", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(header(&backend.forwarded()[0], "authorization").is_empty());
}

#[tokio::test]
async fn readiness_follows_draining_and_metrics_render() {
    let backend = FakeBackend::new(issued("T"));
    let st = state(EGRESS_YAML, backend);

    let ready = ops::readyz(State(st.clone())).await.into_response();
    assert_eq!(ready.status(), StatusCode::OK);
    st.set_draining();
    let ready = ops::readyz(State(st.clone())).await.into_response();
    assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);

    let text = body_of(ops::metrics(State(st)).await).await;
    let text = String::from_utf8(text.to_vec()).unwrap();
    assert!(text.contains("# TYPE meshpep_requests_total counter"));
    assert!(text.contains("meshpep_draining 1"));
}
