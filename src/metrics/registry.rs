//! Service Metrics
//!
//! Prometheus counters and gauges for the ranking service, kept in a
//! private registry so several services can coexist in one process.

use prometheus::{Encoder, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::cache::{CacheStats, Lookup};
use crate::error::{FetchError, Result};

/// Metric families exported on `/metrics`
pub struct ServiceMetrics {
    registry: Registry,
    cache_lookups: IntCounterVec,
    cache_entries: IntGaugeVec,
    upstream_requests: IntCounterVec,
    items_dropped: IntCounterVec,
    fetches_in_flight: IntGauge,
    http_requests: IntCounterVec,
}

impl ServiceMetrics {
    /// Create and register every metric family
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let cache_lookups = IntCounterVec::new(
            Opts::new("bestnews_cache_lookups_total", "Cache lookups by tier and outcome"),
            &["tier", "outcome"],
        )?;
        let cache_entries = IntGaugeVec::new(
            Opts::new("bestnews_cache_entries", "Cache slots by tier and state"),
            &["tier", "state"],
        )?;
        let upstream_requests = IntCounterVec::new(
            Opts::new("bestnews_upstream_requests_total", "Upstream round trips by endpoint and outcome"),
            &["endpoint", "outcome"],
        )?;
        let items_dropped = IntCounterVec::new(
            Opts::new("bestnews_items_dropped_total", "Items excluded from a ranking"),
            &["reason"],
        )?;
        let fetches_in_flight = IntGauge::new(
            "bestnews_fetches_in_flight",
            "Item retrievals currently holding a concurrency permit",
        )?;
        let http_requests = IntCounterVec::new(
            Opts::new("bestnews_http_requests_total", "HTTP API responses by status"),
            &["status"],
        )?;

        registry.register(Box::new(cache_lookups.clone()))?;
        registry.register(Box::new(cache_entries.clone()))?;
        registry.register(Box::new(upstream_requests.clone()))?;
        registry.register(Box::new(items_dropped.clone()))?;
        registry.register(Box::new(fetches_in_flight.clone()))?;
        registry.register(Box::new(http_requests.clone()))?;

        Ok(Self {
            registry,
            cache_lookups,
            cache_entries,
            upstream_requests,
            items_dropped,
            fetches_in_flight,
            http_requests,
        })
    }

    pub fn record_lookup(&self, tier: &str, lookup: Lookup) {
        self.cache_lookups
            .with_label_values(&[tier, lookup.as_str()])
            .inc();
    }

    /// Record one upstream round trip; `None` means success
    pub fn record_upstream(&self, endpoint: &str, failure: Option<&FetchError>) {
        let outcome = failure.map(FetchError::kind).unwrap_or("ok");
        self.upstream_requests
            .with_label_values(&[endpoint, outcome])
            .inc();
    }

    pub fn record_dropped(&self, reason: &str) {
        self.items_dropped.with_label_values(&[reason]).inc();
    }

    pub fn record_http(&self, status: u16) {
        self.http_requests
            .with_label_values(&[status.to_string().as_str()])
            .inc();
    }

    /// Gauge of permits currently held
    pub fn fetches_in_flight(&self) -> &IntGauge {
        &self.fetches_in_flight
    }

    /// Publish a tier snapshot into the entry gauges
    pub fn observe_cache(&self, stats: &CacheStats) {
        let states = [
            ("active", stats.active_entries),
            ("expired", stats.expired_entries),
            ("populating", stats.populating_entries),
        ];
        for (state, count) in states {
            self.cache_entries
                .with_label_values(&[stats.tier, state])
                .set(count as i64);
        }
    }

    /// Render the registry in the Prometheus text format.
    ///
    /// Returns the content type alongside the encoded body.
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }

    #[cfg(test)]
    pub(crate) fn lookup_count(&self, tier: &str, lookup: Lookup) -> u64 {
        self.cache_lookups
            .with_label_values(&[tier, lookup.as_str()])
            .get()
    }

    #[cfg(test)]
    pub(crate) fn dropped_count(&self, reason: &str) -> u64 {
        self.items_dropped.with_label_values(&[reason]).get()
    }
}

impl std::fmt::Debug for ServiceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceMetrics").finish_non_exhaustive()
    }
}
