//! In-memory host stream: one intercepted request as seen by the host.
//!
//! The sidecar host builds one `HostStream` per request and drives the filter
//! through it; tests use the same type directly. It keeps a full record of
//! what the filter did (dispatches, header mutations, synthetic responses,
//! resumes) and owns the host side of correlation: a callback is delivered
//! only when its id matches the single outstanding call.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::{
    CallId, CallOutcome, Callout, DispatchError, HeaderMutation, HostRuntime, HttpFilter,
    SyntheticResponse,
};

#[derive(Debug, Default)]
pub struct HostStream {
    context_id: u64,
    headers: Vec<(String, String)>,
    mutations: Vec<HeaderMutation>,
    dispatched: Vec<(CallId, Callout)>,
    queued: Option<(CallId, Callout)>,
    pending: Option<CallId>,
    next_call: u32,
    clusters: Option<Arc<BTreeSet<String>>>,
    refuse: Option<DispatchError>,
    responses: Vec<SyntheticResponse>,
    resumed: usize,
}

impl HostStream {
    pub fn new(context_id: u64) -> Self {
        Self {
            context_id,
            next_call: 1,
            ..Self::default()
        }
    }

    /// Builder: append a request header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Builder: only accept dispatches to these clusters.
    pub fn with_clusters(mut self, clusters: Arc<BTreeSet<String>>) -> Self {
        self.clusters = Some(clusters);
        self
    }

    /// Builder: refuse every dispatch with `err`.
    pub fn refusing(mut self, err: DispatchError) -> Self {
        self.refuse = Some(err);
        self
    }

    /// All request headers in order, pseudo headers included.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Every value of `name` (case-insensitive).
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn mutations(&self) -> &[HeaderMutation] {
        &self.mutations
    }

    /// Every call the filter dispatched, accepted or not yet executed.
    pub fn dispatched(&self) -> &[(CallId, Callout)] {
        &self.dispatched
    }

    /// Correlation id the host is waiting on, if any.
    pub fn pending(&self) -> Option<CallId> {
        self.pending
    }

    /// Hand the queued call to the executor. The correlation id stays pending
    /// until [`HostStream::deliver`].
    pub fn take_queued(&mut self) -> Option<(CallId, Callout)> {
        self.queued.take()
    }

    pub fn responses(&self) -> &[SyntheticResponse] {
        &self.responses
    }

    /// The synthetic response that terminated the request, if any.
    pub fn response(&self) -> Option<&SyntheticResponse> {
        self.responses.first()
    }

    pub fn resume_count(&self) -> usize {
        self.resumed
    }

    /// Deliver a call result to `filter` if `call_id` is the outstanding
    /// call. Returns whether the callback was delivered.
    pub fn deliver(
        &mut self,
        filter: &mut dyn HttpFilter,
        call_id: CallId,
        outcome: CallOutcome,
    ) -> bool {
        if self.pending != Some(call_id) {
            tracing::debug!(
                ctx = self.context_id,
                call_id = %call_id,
                "dropping uncorrelated call result"
            );
            return false;
        }
        self.pending = None;
        self.queued = None;
        filter.on_call_result(self, call_id, outcome);
        true
    }
}

impl HostRuntime for HostStream {
    fn request_header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    fn set_request_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        self.mutations.push(HeaderMutation::set(name, value));
    }

    fn add_request_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
        self.mutations.push(HeaderMutation::add(name, value));
    }

    fn dispatch_call(&mut self, call: Callout) -> Result<CallId, DispatchError> {
        if let Some(err) = &self.refuse {
            return Err(err.clone());
        }
        if self.pending.is_some() {
            return Err(DispatchError::Busy);
        }
        if let Some(clusters) = &self.clusters {
            if !clusters.contains(&call.cluster) {
                return Err(DispatchError::UnknownCluster(call.cluster));
            }
        }

        let id = CallId(self.next_call);
        self.next_call = self.next_call.wrapping_add(1);
        self.pending = Some(id);
        self.dispatched.push((id, call.clone()));
        self.queued = Some((id, call));
        Ok(id)
    }

    fn send_synthetic_response(&mut self, response: SyntheticResponse) {
        if !self.responses.is_empty() {
            tracing::warn!(ctx = self.context_id, "second synthetic response ignored");
        }
        self.responses.push(response);
    }

    fn resume_request(&mut self) {
        self.resumed += 1;
    }
}
