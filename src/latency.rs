//! Per-request latency observation.

use std::time::Duration;

use http::Method;
use url::Url;

/// Receives the wall-clock latency of every finished request, including
/// ones that failed before reaching the transport.
pub trait LatencyObserver: Send + Sync {
    fn observe(&self, verb: &Method, url: &Url, elapsed: Duration);
}

/// Default observer that emits a structured `tracing` event per request.
pub struct TracingLatency;

impl LatencyObserver for TracingLatency {
    fn observe(&self, verb: &Method, url: &Url, elapsed: Duration) {
        tracing::debug!(
            target: "restkit::latency",
            verb = %verb,
            url = %url,
            latency_ms = elapsed.as_millis() as u64,
            "request finished",
        );
    }
}
