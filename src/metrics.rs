use std::sync::Arc;

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

// ---------------------------------------------------------------------------
// Label types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CheckLabels {
    pub outcome: CheckOutcome,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum CheckOutcome {
    Granted,
    NotFound,
    InvalidTier,
    TierLocked,
    BadRequest,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DownloadLabels {
    pub outcome: DownloadOutcome,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum DownloadOutcome {
    Streamed,
    Rejected,
    NotFound,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct UpstreamLabels {
    pub endpoint: UpstreamEndpoint,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum UpstreamEndpoint {
    Raw,
    Listing,
    Ping,
}

// ---------------------------------------------------------------------------
// Metrics struct
// ---------------------------------------------------------------------------

/// Central container for every Prometheus metric exposed by the proxy.
pub struct Metrics {
    // -- HTTP outcomes --
    pub access_checks_total: Family<CheckLabels, Counter>,
    pub downloads_total: Family<DownloadLabels, Counter>,

    // -- listing --
    pub listing_requests_total: Counter,
    pub listing_bundles: Gauge,

    // -- upstream store --
    pub upstream_requests_total: Family<UpstreamLabels, Counter>,
    pub upstream_errors_total: Family<UpstreamLabels, Counter>,
    pub upstream_duration_seconds: Family<UpstreamLabels, Histogram>,
}

impl Metrics {
    /// Create a new [`Metrics`] instance and register every metric with the
    /// supplied `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let access_checks_total = Family::<CheckLabels, Counter>::default();
        registry.register(
            "modgate_access_checks",
            "Access checks by outcome",
            access_checks_total.clone(),
        );

        let downloads_total = Family::<DownloadLabels, Counter>::default();
        registry.register(
            "modgate_downloads",
            "Download requests by outcome",
            downloads_total.clone(),
        );

        let listing_requests_total = Counter::default();
        registry.register(
            "modgate_listing_requests",
            "Mod listing requests served",
            listing_requests_total.clone(),
        );

        let listing_bundles: Gauge = Gauge::default();
        registry.register(
            "modgate_listing_bundles",
            "Number of mods in the most recent listing",
            listing_bundles.clone(),
        );

        let upstream_requests_total = Family::<UpstreamLabels, Counter>::default();
        registry.register(
            "modgate_upstream_requests",
            "Requests sent to the content store by endpoint",
            upstream_requests_total.clone(),
        );

        let upstream_errors_total = Family::<UpstreamLabels, Counter>::default();
        registry.register(
            "modgate_upstream_errors",
            "Content store transport failures by endpoint",
            upstream_errors_total.clone(),
        );

        let upstream_duration_seconds =
            Family::<UpstreamLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.01, 2.0, 12))
            });
        registry.register(
            "modgate_upstream_duration_seconds",
            "Time until the content store answered, in seconds",
            upstream_duration_seconds.clone(),
        );

        Self {
            access_checks_total,
            downloads_total,
            listing_requests_total,
            listing_bundles,
            upstream_requests_total,
            upstream_errors_total,
            upstream_duration_seconds,
        }
    }

    pub fn record_check(&self, outcome: CheckOutcome) {
        self.access_checks_total
            .get_or_create(&CheckLabels { outcome })
            .inc();
    }

    pub fn record_download(&self, outcome: DownloadOutcome) {
        self.downloads_total
            .get_or_create(&DownloadLabels { outcome })
            .inc();
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Thread-safe wrapper for the metrics registry, used in [`AppState`](crate::AppState).
#[derive(Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
}

impl MetricsRegistry {
    /// Build a fresh registry and pre-register all proxy metrics.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);
        Self {
            registry: Arc::new(registry),
            metrics: Arc::new(metrics),
        }
    }

    /// Render the registry in OpenMetrics text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        prometheus_client::encoding::text::encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
