//! Shared, read-only state of one sidecar process.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use meshpep_core::error::Result;

use crate::config::SidecarConfig;
use crate::filters;
use crate::host::{HttpBackend, ReqwestBackend};
use crate::obs::metrics::SidecarMetrics;
use crate::runtime::FilterFactory;

#[derive(Clone)]
pub struct SidecarState {
    inner: Arc<SidecarStateInner>,
}

struct SidecarStateInner {
    factory: Arc<dyn FilterFactory>,
    backend: Arc<dyn HttpBackend>,
    clusters: Arc<BTreeSet<String>>,
    metrics: SidecarMetrics,
    next_context: AtomicU64,
}

impl SidecarState {
    /// Build state with the `reqwest` backend.
    pub fn new(cfg: SidecarConfig) -> Result<Self> {
        let backend = Arc::new(ReqwestBackend::new(&cfg.sidecar)?);
        Self::with_backend(cfg, backend)
    }

    /// Build state with a caller-supplied backend.
    pub fn with_backend(cfg: SidecarConfig, backend: Arc<dyn HttpBackend>) -> Result<Self> {
        let factory = filters::build_factory(&cfg)?;
        let clusters = Arc::new(cfg.sidecar.clusters.keys().cloned().collect());
        tracing::info!(
            role = factory.role(),
            clusters = ?cfg.sidecar.clusters.keys().collect::<Vec<_>>(),
            "sidecar state ready"
        );
        Ok(Self {
            inner: Arc::new(SidecarStateInner {
                factory,
                backend,
                clusters,
                metrics: SidecarMetrics::default(),
                next_context: AtomicU64::new(1),
            }),
        })
    }

    pub fn factory(&self) -> &dyn FilterFactory {
        self.inner.factory.as_ref()
    }

    pub fn backend(&self) -> &dyn HttpBackend {
        self.inner.backend.as_ref()
    }

    /// Clusters the host accepts dispatches to.
    pub fn clusters(&self) -> Arc<BTreeSet<String>> {
        Arc::clone(&self.inner.clusters)
    }

    pub fn metrics(&self) -> &SidecarMetrics {
        &self.inner.metrics
    }

    pub fn next_context_id(&self) -> u64 {
        self.inner.next_context.fetch_add(1, Ordering::Relaxed)
    }

    pub fn set_draining(&self) {
        self.inner.metrics.set_draining();
    }

    pub fn is_draining(&self) -> bool {
        self.inner.metrics.is_draining()
    }
}
