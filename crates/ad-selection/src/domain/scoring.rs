use {
    crate::{
        domain::{
            auction::{AuctionConfig, Signals},
            bidding::BidOutcome,
            overrides::{DevContext, DevOverrides},
            reporting::debug::DebugReportUris,
        },
        infra::{
            HttpClient,
            ScriptEngine,
            http,
            script::{self, Function},
        },
    },
    itertools::Itertools,
    serde::Deserialize,
    serde_json::{Value, json},
    std::sync::Arc,
    thiserror::Error,
    url::Url,
};

/// A bid with the score the seller assigned to it.
#[derive(Debug, Clone)]
pub struct ScoredOutcome {
    pub bid: BidOutcome,
    pub score: f64,
    pub reject_reason: Option<String>,
    pub debug_reports: DebugReportUris,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to fetch {what}: {source}")]
    Fetch {
        what: &'static str,
        source: http::Error,
    },
    #[error("malformed trusted scoring signals: {0}")]
    Signals(serde_json::Error),
    #[error(transparent)]
    Script(#[from] script::Error),
}

/// `scoreAd` returns either a plain score or a score with details.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AdScore {
    Plain(f64),
    #[serde(rename_all = "camelCase")]
    Detailed {
        score: f64,
        #[serde(default)]
        reject_reason: Option<String>,
        #[serde(default)]
        debug_report: DebugReportUris,
    },
}

/// Runs the seller decision logic once over all bids of an auction.
pub struct ScoreEngine {
    script: Arc<dyn ScriptEngine>,
    http: Arc<dyn HttpClient>,
    overrides: DevOverrides,
}

impl ScoreEngine {
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

    /// Scores every bid. The result has one entry per bid, in bid order.
    pub async fn score(
        &self,
        bids: Vec<BidOutcome>,
        config: &AuctionConfig,
        dev: &DevContext,
    ) -> Result<Vec<ScoredOutcome>, Error> {
        let (decision_logic, trusted_signals) = match self.overrides.auction(config, dev).await {
            Some(entry) => (
                entry.decision_logic,
                entry.trusted_scoring_signals.unwrap_or_default(),
            ),
            None => (
                self.fetch(&config.decision_logic_uri, "decision logic")
                    .await?,
                self.trusted_signals(&bids, config).await?,
            ),
        };

        let ads: Vec<Value> = bids
            .iter()
            .map(|outcome| json!({ "ad": outcome.ad, "bid": outcome.bid }))
            .collect();
        let contextual: Vec<Value> = bids
            .iter()
            .map(|outcome| outcome.contextual_signals.as_json().clone())
            .collect();
        let groups: Vec<Value> = bids.iter().map(|outcome| outcome.group.signals()).collect();
        let args = vec![
            Value::Array(ads),
            json!(config),
            config.seller_signals.as_json().clone(),
            trusted_signals.as_json().clone(),
            Value::Array(contextual),
            Value::Array(groups),
        ];
        let result = self
            .script
            .evaluate(&decision_logic, Function::ScoreAd, args)
            .await?;
        let scores: Vec<AdScore> = script::decode(Function::ScoreAd, result)?;
        if scores.len() != bids.len() {
            return Err(script::Error::Validation(format!(
                "expected {} scores but got {}",
                bids.len(),
                scores.len()
            ))
            .into());
        }

        Ok(bids
            .into_iter()
            .zip(scores)
            .map(|(bid, score)| match score {
                AdScore::Plain(score) => ScoredOutcome {
                    bid,
                    score,
                    reject_reason: None,
                    debug_reports: Default::default(),
                },
                AdScore::Detailed {
                    score,
                    reject_reason,
                    debug_report,
                } => ScoredOutcome {
                    bid,
                    score,
                    reject_reason,
                    debug_reports: debug_report,
                },
            })
            .collect())
    }

    async fn trusted_signals(
        &self,
        bids: &[BidOutcome],
        config: &AuctionConfig,
    ) -> Result<Signals, Error> {
        let Some(uri) = &config.trusted_scoring_signals_uri else {
            return Ok(Signals::default());
        };
        let mut url = uri.clone();
        url.query_pairs_mut().append_pair(
            "renderuris",
            &bids
                .iter()
                .map(|outcome| outcome.ad.render_uri.as_str())
                .unique()
                .join(","),
        );
        let body = self.fetch(&url, "trusted scoring signals").await?;
        Signals::parse(&body).map_err(Error::Signals)
    }

    async fn fetch(&self, url: &Url, what: &'static str) -> Result<String, Error> {
        self.http
            .fetch(url)
            .await
            .map_err(|source| Error::Fetch { what, source })
    }
}
