//! Network side of the reference host: executes callouts and forwards
//! admitted requests upstream.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use meshpep_core::error::{PepError, Result};
use reqwest::Client;

use crate::config::SidecarSection;
use crate::runtime::{CallOutcome, Callout};

/// Request headers never copied to the upstream hop.
const HOP_BY_HOP: [&str; 10] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// A request admitted by the filter, headers already mutated.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: String,
    /// Path and query.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

#[async_trait]
pub trait HttpBackend: Send + Sync {
    /// Execute one out-of-band call. Never fails; every failure is an outcome.
    async fn call(&self, callout: &Callout) -> CallOutcome;

    /// Forward an admitted request to the local upstream.
    async fn forward(&self, req: ForwardRequest) -> Result<UpstreamResponse>;
}

/// `reqwest` backed implementation. Clusters resolve by name to base URLs.
pub struct ReqwestBackend {
    client: Client,
    clusters: BTreeMap<String, String>,
    upstream: String,
}

impl ReqwestBackend {
    pub fn new(sidecar: &SidecarSection) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| PepError::Internal(format!("http client build failed: {e}")))?;
        Ok(Self {
            client,
            clusters: sidecar.clusters.clone(),
            upstream: sidecar.upstream.trim_end_matches('/').to_string(),
        })
    }
}

fn method(raw: &str) -> Option<reqwest::Method> {
    reqwest::Method::from_bytes(raw.as_bytes()).ok()
}

fn collect_headers(map: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
    map.iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect()
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn call(&self, callout: &Callout) -> CallOutcome {
        let Some(base) = self.clusters.get(&callout.cluster) else {
            return CallOutcome::TransportFailure(format!(
                "no address for cluster {}",
                callout.cluster
            ));
        };
        let Some(m) = method(&callout.method) else {
            return CallOutcome::TransportFailure(format!("invalid method {}", callout.method));
        };
        let url = format!("{}{}", base.trim_end_matches('/'), callout.path);

        let sent = self
            .client
            .request(m, url)
            .header(reqwest::header::HOST, &callout.authority)
            .header(reqwest::header::CONTENT_TYPE, &callout.content_type)
            .timeout(Duration::from_millis(callout.timeout_ms))
            .body(callout.body.clone())
            .send()
            .await;

        let resp = match sent {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return CallOutcome::TimedOut,
            Err(e) => return CallOutcome::TransportFailure(e.to_string()),
        };
        let status = resp.status().as_u16();
        let headers = collect_headers(resp.headers());
        match resp.bytes().await {
            Ok(body) => CallOutcome::Response { status, headers, body },
            Err(e) if e.is_timeout() => CallOutcome::TimedOut,
            Err(e) => CallOutcome::TransportFailure(e.to_string()),
        }
    }

    async fn forward(&self, req: ForwardRequest) -> Result<UpstreamResponse> {
        let m = method(&req.method)
            .ok_or_else(|| PepError::Upstream(format!("invalid method {}", req.method)))?;
        let url = format!("{}{}", self.upstream, req.path);

        let mut builder = self.client.request(m, url);
        for (k, v) in req.headers.iter().filter(|(k, _)| !k.starts_with(':') && !is_hop_by_hop(k)) {
            builder = builder.header(k.as_str(), v.as_str());
        }
        let resp = builder
            .body(req.body)
            .send()
            .await
            .map_err(|e| PepError::Upstream(e.to_string()))?;

        let status = resp.status().as_u16();
        let headers = collect_headers(resp.headers())
            .into_iter()
            .filter(|(k, _)| !is_hop_by_hop(k))
            .collect();
        let body = resp.bytes().await.map_err(|e| PepError::Upstream(e.to_string()))?;
        Ok(UpstreamResponse { status, headers, body })
    }
}
