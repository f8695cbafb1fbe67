use {
    crate::{
        domain::{
            auction::{AuctionConfig, Signals},
            candidate::{Ad, CandidateGroup},
            overrides::{DevContext, DevOverrides},
            reporting::debug::DebugReportUris,
        },
        infra::{
            HttpClient,
            ScriptEngine,
            http,
            observe,
            script::{self, Function},
        },
    },
    serde::Deserialize,
    serde_json::json,
    std::sync::Arc,
    thiserror::Error,
};

/// The best bid of one candidate group.
#[derive(Debug, Clone)]
pub struct BidOutcome {
    pub group: Arc<CandidateGroup>,
    pub ad: Ad,
    pub bid: f64,
    /// Logic that generated the bid, kept for win reporting.
    pub bidding_logic: String,
    pub contextual_signals: Signals,
    pub debug_reports: DebugReportUris,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to fetch {what}: {source}")]
    Fetch {
        what: &'static str,
        source: http::Error,
    },
    #[error("malformed trusted bidding signals: {0}")]
    Signals(serde_json::Error),
    #[error(transparent)]
    Script(#[from] script::Error),
}

/// One entry of the `generateBid` result, one per ad of the group.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedBid {
    ad: Ad,
    bid: f64,
    #[serde(default)]
    debug_report: DebugReportUris,
}

/// Runs buyer bidding logic for one candidate group at a time. Holds no
/// state between calls.
pub struct BidEngine {
    script: Arc<dyn ScriptEngine>,
    http: Arc<dyn HttpClient>,
    overrides: DevOverrides,
}

impl BidEngine {
    pub fn new(
        script: Arc<dyn ScriptEngine>,
        http: Arc<dyn HttpClient>,
        overrides: DevOverrides,
    ) -> Self {
        Self {
            script,
            http,
            overrides,
        }
    }

    /// Returns the highest positive bid of the group, `None` if the group
    /// didn't produce one.
    pub async fn bid(
        &self,
        group: Arc<CandidateGroup>,
        buyer_signals: &Signals,
        contextual_signals: Signals,
        config: &AuctionConfig,
        dev: &DevContext,
    ) -> Result<Option<BidOutcome>, Error> {
        if group.ads.is_empty() {
            observe::group_without_ads(&group.id);
            return Ok(None);
        }

        let group_override = self.overrides.group(&group.id, dev).await;
        let (bidding_logic, trusted_signals) = match group_override {
            Some(entry) => (
                entry.bidding_logic,
                entry.trusted_bidding_signals.unwrap_or_default(),
            ),
            None => (
                self.fetch(&group.bidding_logic_uri, "bidding logic").await?,
                self.trusted_signals(&group).await?,
            ),
        };

        let args = vec![
            json!(group.ads),
            config.auction_signals.as_json().clone(),
            buyer_signals.as_json().clone(),
            trusted_signals.as_json().clone(),
            contextual_signals.as_json().clone(),
            group.user_bidding_signals.as_json().clone(),
            group.signals(),
        ];
        let result = self
            .script
            .evaluate(&bidding_logic, Function::GenerateBid, args)
            .await?;
        let bids: Option<Vec<Option<GeneratedBid>>> =
            script::decode(Function::GenerateBid, result)?;

        // Strictly greater keeps the first of equal bids.
        let best = bids
            .into_iter()
            .flatten()
            .flatten()
            .filter(|generated| generated.bid > 0.0)
            .reduce(|best, generated| {
                if generated.bid > best.bid {
                    generated
                } else {
                    best
                }
            });
        Ok(best.map(|generated| BidOutcome {
            group,
            ad: generated.ad,
            bid: generated.bid,
            bidding_logic,
            contextual_signals,
            debug_reports: generated.debug_report,
        }))
    }

    async fn trusted_signals(&self, group: &CandidateGroup) -> Result<Signals, Error> {
        let Some(trusted) = &group.trusted_bidding_data else {
            return Ok(Signals::default());
        };
        let body = self
            .fetch(&trusted.lookup_url(), "trusted bidding signals")
            .await?;
        Signals::parse(&body).map_err(Error::Signals)
    }

    async fn fetch(&self, url: &url::Url, what: &'static str) -> Result<String, Error> {
        self.http
            .fetch(url)
            .await
            .map_err(|source| Error::Fetch { what, source })
    }
}
