use {
    super::{Deliveries, Destination, RegisteredInteraction, deliver},
    crate::{
        domain::{
            Error,
            Status,
            auction::{self, AdTechIdentifier, AuctionConfig, AuctionResult, Signals},
            filter::{self, Admission, RequestFilter},
            overrides::{DevContext, DevOverrides},
        },
        infra::{
            Config,
            HttpClient,
            Persistence,
            Platform,
            ScriptEngine,
            observe,
            script::{self, Function},
            throttle::Api,
        },
    },
    serde::Deserialize,
    serde_json::json,
    std::sync::Arc,
    tokio::time::Instant,
    url::Url,
};

pub const UNKNOWN_AUCTION_ID: &str = "Unable to find ad selection with given ID";
pub const CALLER_PACKAGE_MISMATCH: &str =
    "Caller package name does not match name used in ad selection";

/// Result of the seller's `reportResult`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SellerReport {
    #[serde(default)]
    signals_for_buyer: Signals,
    #[serde(default)]
    reporting_uri: Option<Url>,
    #[serde(default)]
    interaction_reporting_uris: Vec<InteractionUri>,
}

/// Result of the buyer's `reportWin`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuyerReport {
    #[serde(default)]
    reporting_uri: Option<Url>,
    #[serde(default)]
    interaction_reporting_uris: Vec<InteractionUri>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InteractionUri {
    interaction_key: String,
    uri: Url,
}

/// Reporting URIs computed by seller and buyer logic.
#[derive(Debug)]
struct ReportingUris {
    seller: Option<Url>,
    buyer: Option<Url>,
    buyer_id: AdTechIdentifier,
}

/// Reports the impression of an auction winner to its seller and buyer.
pub struct ImpressionReporter {
    config: Arc<Config>,
    filter: Arc<RequestFilter>,
    persistence: Persistence,
    script: Arc<dyn ScriptEngine>,
    http: Arc<dyn HttpClient>,
    platform: Arc<dyn Platform>,
    overrides: DevOverrides,
}

impl ImpressionReporter {
    pub fn new(
        config: Arc<Config>,
        filter: Arc<RequestFilter>,
        persistence: Persistence,
        script: Arc<dyn ScriptEngine>,
        http: Arc<dyn HttpClient>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        let overrides = DevOverrides::new(persistence.overrides.clone());
        Self {
            config,
            filter,
            persistence,
            script,
            http,
            platform,
            overrides,
        }
    }

    /// Runs the reporting logic of the auction `id` and dispatches the
    /// resulting notifications. Replies once the notifications are
    /// scheduled, their outcome never affects the reply.
    pub async fn report_impression(
        &self,
        id: auction::Id,
        config: &AuctionConfig,
        caller: &str,
    ) -> Result<Deliveries, Error> {
        let start = Instant::now();
        let result = self.report(id, config, caller).await;
        let status = match &result {
            Ok((_, Admission::ConsentRevoked)) => Status::ConsentRevoked,
            Ok(_) => Status::Success,
            Err(err) => err.status(),
        };
        observe::impression_reported(caller, id, status, start.elapsed());
        result.map(|(deliveries, _)| deliveries)
    }

    async fn report(
        &self,
        id: auction::Id,
        config: &AuctionConfig,
        caller: &str,
    ) -> Result<(Deliveries, Admission), Error> {
        let admission = self.filter.filter(&filter::Request {
            api: Api::ReportImpression,
            caller,
            ad_tech: Some(&config.seller),
            enforce_foreground: self.config.reporting.enforce_foreground_impression,
            enforce_consent: true,
        })?;
        if admission == Admission::ConsentRevoked {
            return Ok((Deliveries::default(), admission));
        }
        config.validate()?;

        let dev = DevContext::new(caller, self.platform.as_ref());
        let uris = tokio::time::timeout(
            self.config.reporting.impression_overall_timeout,
            self.reporting_uris(id, config, &dev),
        )
        .await
        .map_err(|_| Error::Timeout)??;
        Ok((self.dispatch(uris, config), admission))
    }

    async fn reporting_uris(
        &self,
        id: auction::Id,
        config: &AuctionConfig,
        dev: &DevContext,
    ) -> Result<ReportingUris, Error> {
        let results = &self.persistence.results;
        if !results.id_exists(id).await? {
            return Err(Error::InvalidArgument(UNKNOWN_AUCTION_ID.into()));
        }
        if !results.id_exists_for_caller(id, &dev.caller).await? {
            return Err(Error::InvalidArgument(CALLER_PACKAGE_MISMATCH.into()));
        }
        let result = results
            .get_result(id)
            .await?
            .ok_or_else(|| Error::InvalidArgument(UNKNOWN_AUCTION_ID.into()))?;
        let buyer = result.winner.buyer.clone();
        let auction_override = self.overrides.auction(config, dev).await;

        let seller_logic = match &auction_override {
            Some(entry) => entry.decision_logic.clone(),
            None => self.fetch(&config.decision_logic_uri).await?,
        };
        let seller_result = self
            .script
            .evaluate(
                &seller_logic,
                Function::ReportResult,
                vec![
                    json!(config),
                    json!(result.render_uri),
                    json!(result.bid),
                    result.seller_contextual_signals.as_json().clone(),
                ],
            )
            .await?;
        let seller: SellerReport = script::decode(Function::ReportResult, seller_result)?;
        self.register_interactions(
            &result,
            Destination::Seller,
            &config.seller,
            seller.interaction_reporting_uris,
        )
        .await;

        let buyer_logic = if !result.bidding_logic.is_empty() {
            result.bidding_logic.clone()
        } else if let Some(logic) = auction_override
            .as_ref()
            .and_then(|entry| entry.buyer_reporting_logic.get(&buyer))
        {
            logic.clone()
        } else {
            self.fetch(&result.bidding_logic_uri).await?
        };
        let buyer_result = self
            .script
            .evaluate(
                &buyer_logic,
                Function::ReportWin,
                vec![
                    config.auction_signals.as_json().clone(),
                    config.buyer_signals(&buyer).as_json().clone(),
                    seller.signals_for_buyer.as_json().clone(),
                    result.buyer_contextual_signals.as_json().clone(),
                    json!({
                        "owner": result.winner.owner,
                        "buyer": result.winner.buyer,
                        "name": result.winner.name,
                    }),
                ],
            )
            .await?;
        let buyer_report: BuyerReport = script::decode(Function::ReportWin, buyer_result)?;
        self.register_interactions(
            &result,
            Destination::Buyer,
            &buyer,
            buyer_report.interaction_reporting_uris,
        )
        .await;

        Ok(ReportingUris {
            seller: seller.reporting_uri,
            buyer: buyer_report.reporting_uri,
            buyer_id: buyer,
        })
    }

    /// Persists interaction reporting URIs registered by reporting logic.
    /// Entries that are too large or point elsewhere than the registering ad
    /// tech are skipped. Failures never fail the impression report.
    async fn register_interactions(
        &self,
        result: &AuctionResult,
        destination: Destination,
        ad_tech: &AdTechIdentifier,
        entries: Vec<InteractionUri>,
    ) {
        let reporting = &self.config.reporting;
        if !reporting.register_ad_beacon_enabled || entries.is_empty() {
            return;
        }
        let interactions: Vec<_> = entries
            .into_iter()
            .filter(|entry| {
                let valid = entry.interaction_key.len() <= reporting.max_interaction_key_size
                    && entry.uri.as_str().len() <= reporting.max_interaction_reporting_uri_size
                    && ad_tech.owns(&entry.uri);
                if !valid {
                    observe::interaction_uri_rejected(destination, &entry.uri);
                }
                valid
            })
            .map(|entry| RegisteredInteraction {
                auction_id: result.id,
                key: entry.interaction_key,
                destination,
                uri: entry.uri,
            })
            .collect();
        match self
            .persistence
            .results
            .insert_interactions(
                result.id,
                &interactions,
                reporting.max_registered_interactions_total,
                reporting.max_registered_interactions_per_destination,
                destination,
            )
            .await
        {
            Ok(committed) => observe::interactions_registered(result.id, destination, committed),
            Err(err) => observe::interaction_registration_failed(result.id, destination, &err),
        }
    }

    /// Sends the seller and buyer notifications independently of each other.
    fn dispatch(&self, uris: ReportingUris, config: &AuctionConfig) -> Deliveries {
        let mut deliveries = Deliveries::default();
        if let Some(uri) = uris.seller {
            if config.seller.owns(&uri) {
                deliveries.push(deliver(
                    self.http.clone(),
                    observe::Report::Impression,
                    Destination::Seller,
                    uri,
                    None,
                ));
            } else {
                observe::reporting_uri_rejected(Destination::Seller, &uri);
            }
        }
        if let Some(uri) = uris.buyer {
            let enrolled =
                !self.config.enrollment_check_enabled || self.platform.is_enrolled(&uris.buyer_id);
            if uris.buyer_id.owns(&uri) && enrolled {
                deliveries.push(deliver(
                    self.http.clone(),
                    observe::Report::Impression,
                    Destination::Buyer,
                    uri,
                    None,
                ));
            } else {
                observe::reporting_uri_rejected(Destination::Buyer, &uri);
            }
        }
        deliveries
    }

    async fn fetch(&self, url: &Url) -> Result<String, Error> {
        self.http
            .fetch(url)
            .await
            .map_err(|err| Error::Internal(format!("failed to fetch reporting logic: {err}")))
    }
}
