/// Metrics for ad selection.
#[derive(Debug, Clone, prometheus_metric_storage::MetricStorage)]
pub struct Metrics {
    /// Terminal outcomes of API calls.
    #[metric(labels("api", "status"))]
    pub api_calls: prometheus::IntCounterVec,
    /// End to end auction latency.
    #[metric(buckets(0.05, 0.1, 0.25, 0.5, 0.75, 1.0, 1.5, 2.0, 3.0, 4.0, 5.0, 7.5, 10.0))]
    pub auction_duration_seconds: prometheus::Histogram,
    /// Reasons for discarded bids.
    #[metric(labels("reason"))]
    pub discarded_bids: prometheus::IntCounterVec,
    /// The results of reporting notifications.
    #[metric(labels("report", "destination", "result"))]
    pub notifications: prometheus::IntCounterVec,
    /// Registered interaction reporting URIs that were persisted.
    #[metric(labels("destination"))]
    pub registered_interactions: prometheus::IntCounterVec,
    /// The results of sending debug reports.
    #[metric(labels("result"))]
    pub debug_reports: prometheus::IntCounterVec,
    /// Auction results removed after expiring.
    pub expired_results: prometheus::IntCounter,
}

/// Setup the metrics registry.
pub fn init() {
    observe::metrics::setup_registry_reentrant(Some("ad_selection".to_owned()), None);
}

/// Get the metrics instance.
pub fn get() -> &'static Metrics {
    Metrics::instance(observe::metrics::get_storage_registry())
        .expect("unexpected error getting metrics instance")
}
