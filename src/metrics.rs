use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder once per process and describe all series.
    ///
    /// Later calls (tests building several apps) reuse the same handle.
    pub fn init() -> anyhow::Result<Self> {
        static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();
        let handle = HANDLE.get_or_try_init(|| {
            // Default buckets to avoid API differences across crate versions.
            let handle = PrometheusBuilder::new().install_recorder()?;
            describe_all();
            Ok::<_, anyhow::Error>(handle)
        })?;
        Ok(Self {
            handle: handle.clone(),
        })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe_all() {
    describe_counter!(
        "analysis_requests_total",
        "Analysis requests by outcome (ok, validation_error, extraction_error, upstream_unavailable)."
    );
    describe_counter!(
        "analysis_degraded_total",
        "Analyses where a secondary signal fell back to its default."
    );
    describe_histogram!("analysis_duration_ms", "End-to-end analysis time in milliseconds.");
    describe_counter!(
        "collaborator_calls_total",
        "Outbound collaborator calls by collaborator and outcome."
    );
    describe_counter!("trending_cache_hits_total", "Trending requests served from cache.");
    describe_counter!(
        "trending_cache_misses_total",
        "Trending requests that needed a provider call."
    );
    describe_counter!(
        "trending_rate_limited_total",
        "Trending fetches refused by the local rate limiter."
    );
    describe_gauge!("trending_quota_remaining", "Provider calls left today.");
    describe_gauge!("trending_cache_ttl_secs", "Configured trending cache TTL.");
    describe_counter!(
        "persistence_failures_total",
        "Analyses the document store failed to accept."
    );
}
