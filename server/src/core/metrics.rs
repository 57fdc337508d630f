//! Prometheus metrics for search routing, quotas and the shared KV
//!
//! Each [`MetricsService`] owns its own recorder instead of installing a
//! process-global one, so tests and multiple app instances stay isolated.

use std::time::Duration;

use metrics::{Recorder, counter, gauge, histogram, with_local_recorder};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

pub struct MetricsService {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl Default for MetricsService {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsService {
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        Self { recorder, handle }
    }

    fn with<T>(&self, f: impl FnOnce() -> T) -> T {
        let recorder: &dyn Recorder = &self.recorder;
        with_local_recorder(recorder, f)
    }

    /// Render all series in the Prometheus text exposition format
    pub fn render(&self) -> String {
        self.handle.render()
    }

    pub fn record_search(&self, route: &'static str, elapsed: Duration) {
        self.with(|| {
            counter!("search_requests_total", "route" => route).increment(1);
            histogram!("search_resolve_duration_seconds").record(elapsed.as_secs_f64());
        });
    }

    pub fn record_degraded(&self, reason: &'static str) {
        self.with(|| counter!("search_degraded_total", "reason" => reason).increment(1));
    }

    pub fn record_cache(&self, result: &'static str) {
        self.with(|| counter!("search_cache_total", "result" => result).increment(1));
    }

    pub fn record_adapter(&self, source: &'static str, outcome: &'static str) {
        self.with(|| {
            counter!("search_adapter_calls_total", "source" => source, "outcome" => outcome)
                .increment(1)
        });
    }

    pub fn record_quota(&self, class: &'static str, outcome: &'static str, backend: &'static str) {
        self.with(|| {
            counter!(
                "quota_consume_total",
                "class" => class,
                "outcome" => outcome,
                "backend" => backend
            )
            .increment(1)
        });
    }

    pub fn record_idempotency(&self, state: &'static str, backend: &'static str) {
        self.with(|| {
            counter!("idempotency_begin_total", "state" => state, "backend" => backend)
                .increment(1)
        });
    }

    pub fn record_kv_error(&self, op: &'static str) {
        self.with(|| counter!("kv_errors_total", "op" => op).increment(1));
    }

    pub fn set_kv_ready(&self, ready: bool) {
        self.with(|| gauge!("kv_ready").set(if ready { 1.0 } else { 0.0 }));
    }

    pub fn record_rate_limited(&self) {
        self.with(|| counter!("rate_limit_rejected_total").increment(1));
    }
}
