use {
    crate::infra::config,
    dashmap::DashMap,
    strum::{Display, IntoStaticStr},
    tokio::time::Instant,
};

/// APIs that are throttled independently of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Api {
    RunAuction,
    ReportImpression,
    ReportInteraction,
    Overrides,
}

/// Token bucket rate limiter per (API, calling package). A bucket holds at
/// most one second worth of permits. A rate of zero disables throttling for
/// that API.
#[derive(Debug)]
pub struct Throttler {
    rates: config::Throttle,
    buckets: DashMap<(Api, String), Bucket>,
}

#[derive(Debug)]
struct Bucket {
    permits: f64,
    refreshed: Instant,
}

impl Throttler {
    pub fn new(rates: config::Throttle) -> Self {
        Self {
            rates,
            buckets: DashMap::new(),
        }
    }

    /// Takes one permit for `package`. Returns `false` when the package
    /// exhausted its budget for `api`.
    pub fn try_acquire(&self, api: Api, package: &str) -> bool {
        let rate = self.rate(api);
        if rate <= 0.0 {
            return true;
        }
        let capacity = rate.max(1.0);
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry((api, package.to_owned()))
            .or_insert(Bucket {
                permits: capacity,
                refreshed: now,
            });
        let refill = now.duration_since(bucket.refreshed).as_secs_f64() * rate;
        bucket.permits = (bucket.permits + refill).min(capacity);
        bucket.refreshed = now;
        if bucket.permits < 1.0 {
            return false;
        }
        bucket.permits -= 1.0;
        true
    }

    fn rate(&self, api: Api) -> f64 {
        match api {
            Api::RunAuction => self.rates.run_auction,
            Api::ReportImpression => self.rates.report_impression,
            Api::ReportInteraction => self.rates.report_interaction,
            Api::Overrides => self.rates.overrides,
        }
    }
}
