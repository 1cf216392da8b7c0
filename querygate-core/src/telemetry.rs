//! Prometheus metrics using prometheus-client crate.
//!
//! `GatewayMetrics` registers the proxy's counters and histograms with a
//! shared `Registry`. The admin server encodes that registry on `/metrics`.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

// ─────────────────────────────────────────────────────────────────────────────
// Label Sets
// ─────────────────────────────────────────────────────────────────────────────

/// Labels for inbound request counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RouteLabels {
    /// "instrumented" or "passthrough"
    pub route: String,
}

/// Labels for metrics dispatch counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DispatchLabels {
    /// "sent", "failed" or "skipped"
    pub outcome: String,
}

/// Labels for origin call counters and latency.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OriginLabels {
    /// Route the call was made for
    pub route: String,
    /// HTTP status code as string, or "error" when no response arrived
    pub status_code: String,
}

/// Origin latency buckets in milliseconds.
static ORIGIN_BUCKETS: &[f64] = &[
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
];

/// Outcome of one metrics dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Sink answered 200.
    Sent,
    /// Transport error or non-200 answer.
    Failed,
    /// Request carried no query; nothing was posted.
    Skipped,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Sent => "sent",
            DispatchOutcome::Failed => "failed",
            DispatchOutcome::Skipped => "skipped",
        }
    }
}

/// All counters and histograms exported by the gateway.
///
/// Cloning a `Family` shares the underlying storage, so the registry and this
/// struct see the same values. Counters are registered without the `_total`
/// suffix; the OpenMetrics encoder appends it.
pub struct GatewayMetrics {
    /// `querygate_requests_total{route}`
    pub requests_total: Family<RouteLabels, Counter>,
    /// `querygate_metrics_dispatch_total{outcome}`
    pub metrics_dispatch_total: Family<DispatchLabels, Counter>,
    /// `querygate_origin_requests_total{route, status_code}`
    pub origin_requests_total: Family<OriginLabels, Counter>,
    /// `querygate_origin_duration_ms{route, status_code}`
    pub origin_duration_ms: Family<OriginLabels, Histogram>,
}

impl GatewayMetrics {
    /// Create and register all gateway metrics with `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let requests_total = Family::<RouteLabels, Counter>::default();
        registry.register(
            "querygate_requests",
            "Inbound requests by route",
            requests_total.clone(),
        );

        let metrics_dispatch_total = Family::<DispatchLabels, Counter>::default();
        registry.register(
            "querygate_metrics_dispatch",
            "Metrics records dispatched to the sink by outcome",
            metrics_dispatch_total.clone(),
        );

        let origin_requests_total = Family::<OriginLabels, Counter>::default();
        registry.register(
            "querygate_origin_requests",
            "Origin calls by route and status code",
            origin_requests_total.clone(),
        );

        let origin_duration_ms = Family::<OriginLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(ORIGIN_BUCKETS.iter().copied())
        });
        registry.register(
            "querygate_origin_duration_ms",
            "Origin call latency in milliseconds, until response headers",
            origin_duration_ms.clone(),
        );

        Self {
            requests_total,
            metrics_dispatch_total,
            origin_requests_total,
            origin_duration_ms,
        }
    }

    /// Count one inbound request on `route`.
    pub fn record_request(&self, route: &str) {
        self.requests_total
            .get_or_create(&RouteLabels {
                route: route.to_string(),
            })
            .inc();
    }

    /// Count one metrics dispatch outcome.
    pub fn record_dispatch(&self, outcome: DispatchOutcome) {
        self.metrics_dispatch_total
            .get_or_create(&DispatchLabels {
                outcome: outcome.as_str().to_string(),
            })
            .inc();
    }

    /// Record one origin call and its latency.
    pub fn record_origin(&self, route: &str, status_code: &str, duration_ms: f64) {
        let labels = OriginLabels {
            route: route.to_string(),
            status_code: status_code.to_string(),
        };
        self.origin_requests_total.get_or_create(&labels).inc();
        self.origin_duration_ms
            .get_or_create(&labels)
            .observe(duration_ms);
    }
}
