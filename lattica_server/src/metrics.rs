//! Prometheus metrics for the API server.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// Metric instruments plus their registry.
pub struct EngineMetrics {
    registry: Registry,
    /// All HTTP requests served.
    pub requests_total: Counter,
    /// Documents ingested.
    pub ingestions_total: Counter,
    /// Search/query requests served.
    pub searches_total: Counter,
    /// Retrieval cache hits.
    pub cache_hits_total: Counter,
    /// End-to-end search latency.
    pub search_latency_seconds: Histogram,
}

impl EngineMetrics {
    /// Create and register all instruments.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let requests_total = Counter::default();
        registry.register("lattica_requests", "Total HTTP requests", requests_total.clone());
        let ingestions_total = Counter::default();
        registry.register(
            "lattica_ingestions",
            "Total documents ingested",
            ingestions_total.clone(),
        );
        let searches_total = Counter::default();
        registry.register("lattica_searches", "Total search requests", searches_total.clone());
        let cache_hits_total = Counter::default();
        registry.register(
            "lattica_cache_hits",
            "Retrieval cache hits",
            cache_hits_total.clone(),
        );
        let search_latency_seconds = Histogram::new(exponential_buckets(0.005, 2.0, 12));
        registry.register(
            "lattica_search_latency_seconds",
            "End-to-end search latency",
            search_latency_seconds.clone(),
        );
        Self {
            registry,
            requests_total,
            ingestions_total,
            searches_total,
            cache_hits_total,
            search_latency_seconds,
        }
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        // Encoding into a String cannot fail.
        let _ = encode(&mut out, &self.registry);
        out
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
