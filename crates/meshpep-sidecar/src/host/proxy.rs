//! Per-request host loop.
//!
//! headers -> filter -> (callout with deadline -> correlated delivery) ->
//! synthetic response, or body read and upstream forward.

use std::time::{Duration, Instant};

use axum::body::{self, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::Instrument;

use crate::app_state::SidecarState;
use crate::obs::metrics::SidecarMetrics;
use crate::runtime::{CallOutcome, Callout, FilterAction, HostStream, HttpFilter};

use super::backend::ForwardRequest;

const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Axum handler wrapper.
pub async fn proxy(State(state): State<SidecarState>, req: Request) -> Response {
    handle(&state, req).await
}

/// Run one request through the filter and, if admitted, the upstream.
pub async fn handle(state: &SidecarState, req: Request) -> Response {
    let context_id = state.next_context_id();
    let role = state.factory().role();
    let span = tracing::info_span!("request", ctx = context_id, role);
    run(state, context_id, role, req).instrument(span).await
}

/// Tears the filter down if the request future is dropped before the filter
/// reached a terminal phase (client disconnect).
struct FilterGuard(Box<dyn HttpFilter>);

impl Drop for FilterGuard {
    fn drop(&mut self) {
        self.0.on_teardown();
    }
}

struct Inflight<'a> {
    metrics: &'a SidecarMetrics,
    role: &'static str,
}

impl<'a> Inflight<'a> {
    fn enter(metrics: &'a SidecarMetrics, role: &'static str) -> Self {
        metrics.requests_inflight.inc(&[("role", role)]);
        Self { metrics, role }
    }
}

impl Drop for Inflight<'_> {
    fn drop(&mut self) {
        self.metrics.requests_inflight.dec(&[("role", self.role)]);
    }
}

async fn run(
    state: &SidecarState,
    context_id: u64,
    role: &'static str,
    req: Request,
) -> Response {
    let metrics = state.metrics();
    let _inflight = Inflight::enter(metrics, role);

    let (parts, body) = req.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let authority = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()));

    let mut stream = HostStream::new(context_id)
        .with_clusters(state.clusters())
        .with_header(":method", parts.method.as_str())
        .with_header(":path", &path);
    if let Some(a) = &authority {
        stream = stream.with_header(":authority", a);
    }
    // obs-text is kept, lossily
    for (k, v) in parts.headers.iter() {
        stream = stream.with_header(k.as_str(), &String::from_utf8_lossy(v.as_bytes()));
    }

    // Body is read only once the filter admits the request.
    let mut filter = FilterGuard(state.factory().create(context_id));
    let action = filter.0.on_request_headers(&mut stream);

    if let Some((call_id, callout)) = stream.take_queued() {
        let outcome = execute(state, &callout).await;
        stream.deliver(filter.0.as_mut(), call_id, outcome);
    }

    if let Some(resp) = stream.response() {
        metrics.requests.inc(&[("role", role), ("outcome", "denied")]);
        if let Some(reason) = resp.reason {
            metrics.denials.inc(&[("role", role), ("code", reason.code())]);
        }
        return build_response(resp.status, &resp.headers, resp.body.clone());
    }

    if action != FilterAction::Continue && stream.resume_count() == 0 {
        tracing::error!(pending = ?stream.pending(), "request left paused with no response");
        metrics.requests.inc(&[("role", role), ("outcome", "error")]);
        return (StatusCode::INTERNAL_SERVER_ERROR, "request was not completed").into_response();
    }

    let body = match body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(error = %e, "request body rejected");
            metrics.requests.inc(&[("role", role), ("outcome", "error")]);
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
        }
    };

    let outcome = if stream.dispatched().is_empty() { "passed" } else { "resumed" };
    metrics.requests.inc(&[("role", role), ("outcome", outcome)]);

    let forward = ForwardRequest {
        method: parts.method.to_string(),
        path,
        headers: stream
            .headers()
            .iter()
            .filter(|(k, _)| !k.starts_with(':'))
            .cloned()
            .collect(),
        body,
    };
    match state.backend().forward(forward).await {
        Ok(up) => build_response(up.status, &up.headers, up.body),
        Err(e) => {
            tracing::warn!(error = %e, code = e.code().as_str(), "upstream forward failed");
            (StatusCode::BAD_GATEWAY, "upstream unavailable").into_response()
        }
    }
}

/// Execute a dispatched call with its deadline.
async fn execute(state: &SidecarState, callout: &Callout) -> CallOutcome {
    let started = Instant::now();
    let deadline = Duration::from_millis(callout.timeout_ms);
    let outcome = match tokio::time::timeout(deadline, state.backend().call(callout)).await {
        Ok(outcome) => outcome,
        Err(_) => CallOutcome::TimedOut,
    };

    let metrics = state.metrics();
    let cluster = callout.cluster.as_str();
    metrics.callouts.inc(&[("cluster", cluster), ("result", outcome.label())]);
    metrics.callout_duration.observe(&[("cluster", cluster)], started.elapsed());
    tracing::debug!(
        %cluster,
        result = outcome.label(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "callout finished"
    );
    outcome
}

fn build_response(status: u16, headers: &[(String, String)], body: Bytes) -> Response {
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    for (k, v) in headers {
        if let (Ok(k), Ok(v)) = (HeaderName::from_bytes(k.as_bytes()), HeaderValue::from_str(v)) {
            resp.headers_mut().append(k, v);
        }
    }
    resp
}
