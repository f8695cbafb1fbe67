//! Event level debug reporting. Bidding and scoring logic may emit win and
//! loss URIs which are finalized after the auction and sent in batches.

use {
    crate::{
        domain::{
            auction::{AdTechIdentifier, selection::Ranking},
            scoring::ScoredOutcome,
        },
        infra::{HttpClient, observe, persistence::DebugReportStore},
    },
    futures::future::join_all,
    serde::Deserialize,
    std::{collections::HashMap, sync::Arc},
    url::Url,
};

/// Reports sent to a single ad tech host per auction.
pub const MAX_REPORTS_PER_HOST: usize = 75;
/// Finalized reports must be shorter than this.
pub const MAX_URI_LENGTH: usize = 2048;

const UNKNOWN: &str = "unknown";

/// Reject reasons sellers may report. Anything else becomes `unknown`.
const REJECT_REASONS: &[&str] = &[
    "not-available",
    "invalid-bid",
    "bid-below-auction-floor",
    "pending-approval-by-exchange",
    "disapproved-by-exchange",
    "blocked-by-publisher",
    "language-exclusions",
    "category-exclusions",
];

/// Unfinalized debug reporting URIs, possibly containing `${...}`
/// placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DebugReportUris {
    #[serde(default)]
    pub win: Option<String>,
    #[serde(default)]
    pub loss: Option<String>,
}

/// Finalizes the debug reports of one auction. The winner gets its win
/// reports, every other bid its loss reports.
pub fn finalize(
    scored: &[ScoredOutcome],
    ranking: &Ranking,
    seller: &AdTechIdentifier,
) -> Vec<Url> {
    let winner = &scored[ranking.winner];
    let runner_up = ranking.runner_up.map(|i| &scored[i]);
    let mut per_host: HashMap<String, usize> = HashMap::new();
    let mut uris = Vec::new();

    for (i, outcome) in scored.iter().enumerate() {
        let won = i == ranking.winner;
        let buyer = outcome.bid.group.buyer();
        let variables = Variables {
            winning_bid: Some(winner.bid.bid),
            made_winning_bid: buyer == winner.bid.group.buyer(),
            highest_scoring_other_bid: runner_up.map(|other| other.bid.bid),
            made_highest_scoring_other_bid: runner_up
                .is_some_and(|other| buyer == other.bid.group.buyer()),
            reject_reason: outcome.reject_reason.as_deref(),
        };
        let reports = [
            (buyer, &outcome.bid.debug_reports),
            (seller, &outcome.debug_reports),
        ];
        for (ad_tech, reports) in reports {
            let template = if won { &reports.win } else { &reports.loss };
            let Some(uri) = template
                .as_deref()
                .and_then(|template| variables.substitute(template, ad_tech))
            else {
                continue;
            };
            let count = per_host.entry(ad_tech.to_string()).or_default();
            if *count >= MAX_REPORTS_PER_HOST {
                observe::debug_report_dropped(ad_tech, "per host limit");
                continue;
            }
            *count += 1;
            uris.push(uri);
        }
    }
    uris
}

struct Variables<'a> {
    winning_bid: Option<f64>,
    made_winning_bid: bool,
    highest_scoring_other_bid: Option<f64>,
    made_highest_scoring_other_bid: bool,
    reject_reason: Option<&'a str>,
}

impl Variables<'_> {
    /// Fills in the placeholders of `template` and validates the result
    /// belongs to `ad_tech`.
    fn substitute(&self, template: &str, ad_tech: &AdTechIdentifier) -> Option<Url> {
        let number = |value: Option<f64>| value.map_or(UNKNOWN.to_owned(), |v| v.to_string());
        let reject_reason = self
            .reject_reason
            .filter(|reason| REJECT_REASONS.contains(reason))
            .unwrap_or(UNKNOWN);
        let replacements = [
            ("winningBid", number(self.winning_bid)),
            ("madeWinningBid", self.made_winning_bid.to_string()),
            ("highestScoringOtherBid", number(self.highest_scoring_other_bid)),
            (
                "madeHighestScoringOtherBid",
                self.made_highest_scoring_other_bid.to_string(),
            ),
            ("rejectReason", reject_reason.to_owned()),
        ];
        let mut uri = template.to_owned();
        for (name, value) in &replacements {
            // URL parsing percent encodes braces in paths.
            uri = uri
                .replace(&format!("${{{name}}}"), value)
                .replace(&format!("$%7B{name}%7D"), value);
        }

        if uri.len() >= MAX_URI_LENGTH {
            observe::debug_report_dropped(ad_tech, "too long");
            return None;
        }
        match Url::parse(&uri) {
            Ok(url) if ad_tech.owns(&url) => Some(url),
            _ => {
                observe::debug_report_dropped(ad_tech, "invalid uri");
                None
            }
        }
    }
}

/// Sends queued debug reports. Invoked periodically by the host.
pub struct DebugReportSender {
    store: Arc<dyn DebugReportStore>,
    http: Arc<dyn HttpClient>,
    batch_size: usize,
}

impl DebugReportSender {
    pub fn new(
        store: Arc<dyn DebugReportStore>,
        http: Arc<dyn HttpClient>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            http,
            batch_size,
        }
    }

    /// Sends one batch of queued reports, each attempted once. Returns how
    /// many were delivered.
    pub async fn run_once(&self) -> anyhow::Result<usize> {
        let uris = self.store.take_debug_reports(self.batch_size).await?;
        let results = join_all(uris.iter().map(|uri| self.http.notify(uri, None))).await;
        let mut sent = 0;
        for (uri, result) in uris.iter().zip(results) {
            match result {
                Ok(()) => sent += 1,
                Err(err) => observe::debug_report_failed(uri, &err),
            }
        }
        observe::debug_reports_sent(sent, uris.len());
        Ok(sent)
    }
}
