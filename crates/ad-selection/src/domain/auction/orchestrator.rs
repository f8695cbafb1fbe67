use {
    super::{AuctionConfig, AuctionResult, Id, Signals, selection},
    crate::{
        domain::{
            Error,
            Status,
            bidding::{BidEngine, BidOutcome},
            candidate::CandidateGroup,
            filter::{self, Admission, RequestFilter},
            overrides::{DevContext, DevOverrides},
            reporting::debug,
            scoring::ScoreEngine,
        },
        infra::{
            Config,
            HttpClient,
            IdGenerator,
            Persistence,
            Platform,
            ScriptEngine,
            observe::{self, DiscardReason, Measure},
            throttle::Api,
        },
    },
    chrono::Utc,
    serde_json::json,
    std::sync::Arc,
    tokio::{sync::Semaphore, task::JoinSet, time::Instant},
    tracing::Instrument,
    url::Url,
};

/// Reply to a successful auction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub id: Id,
    pub render_uri: Url,
}

/// Drives an auction from gating to the persisted winner.
pub struct Orchestrator {
    config: Arc<Config>,
    filter: Arc<RequestFilter>,
    persistence: Persistence,
    platform: Arc<dyn Platform>,
    ids: Arc<dyn IdGenerator>,
    bid_engine: Arc<BidEngine>,
    score_engine: ScoreEngine,
    workers: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        filter: Arc<RequestFilter>,
        persistence: Persistence,
        script: Arc<dyn ScriptEngine>,
        http: Arc<dyn HttpClient>,
        platform: Arc<dyn Platform>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let overrides = DevOverrides::new(persistence.overrides.clone());
        let workers = Arc::new(Semaphore::new(config.auction.max_concurrent_bidding));
        Self {
            bid_engine: Arc::new(BidEngine::new(
                script.clone(),
                http.clone(),
                overrides.clone(),
            )),
            score_engine: ScoreEngine::new(script, http, overrides),
            config,
            filter,
            persistence,
            platform,
            ids,
            workers,
        }
    }

    /// Runs one auction for `caller`. Resolves exactly once: with the
    /// winner, with `None` when the user revoked consent, or with an error.
    /// Nothing is persisted unless a winner is returned.
    pub async fn run_auction(
        &self,
        config: AuctionConfig,
        caller: &str,
    ) -> Result<Option<Selection>, Error> {
        let start = Instant::now();
        let result = self
            .run(config, caller, start)
            .instrument(tracing::info_span!("auction", %caller))
            .await;
        let status = match &result {
            Ok(Some(_)) => Status::Success,
            Ok(None) => Status::ConsentRevoked,
            Err(err) => err.status(),
        };
        observe::auction_finished(
            caller,
            result.as_ref().ok().and_then(Option::as_ref),
            status,
            start.elapsed(),
        );
        result
    }

    async fn run(
        &self,
        config: AuctionConfig,
        caller: &str,
        start: Instant,
    ) -> Result<Option<Selection>, Error> {
        let admission = self.filter.filter(&filter::Request {
            api: Api::RunAuction,
            caller,
            ad_tech: Some(&config.seller),
            enforce_foreground: self.config.auction.enforce_foreground,
            enforce_consent: true,
        })?;
        if admission == Admission::ConsentRevoked {
            return Ok(None);
        }
        config.validate()?;
        observe::auction_started(caller, &config);

        let dev = DevContext::new(caller, self.platform.as_ref());
        let deadline = start + self.config.auction.overall_timeout;
        // Dropping the selection on expiry aborts its bidding tasks, so
        // nothing computed after the deadline is persisted.
        let (selection, debug_reports) =
            match tokio::time::timeout_at(deadline, self.select(Arc::new(config), dev)).await {
                Ok(result) => result?,
                Err(_) => return Err(Error::Timeout),
            };
        self.queue_debug_reports(selection.id, debug_reports).await;
        Ok(Some(selection))
    }

    /// Runs the auction up to the persisted winner. Persisting is the last
    /// step, so a deadline expiring before this resolves leaves no result
    /// behind. Also returns the finalized debug reports.
    async fn select(
        &self,
        config: Arc<AuctionConfig>,
        dev: DevContext,
    ) -> Result<(Selection, Vec<Url>), Error> {
        let groups = self
            .persistence
            .candidates
            .candidates(&config.buyers)
            .await?;
        if groups.is_empty() {
            return Err(Error::NoCandidates);
        }
        observe::candidates(groups.len());

        let bids = self
            .bid_all(groups, &config, &dev)
            .measure("auction_bidding")
            .await;
        if bids.is_empty() {
            return Err(Error::NoValidBids);
        }

        let scored = tokio::time::timeout(
            self.config.auction.scoring_timeout,
            self.score_engine
                .score(bids, &config, &dev)
                .measure("auction_scoring"),
        )
        .await
        .map_err(|_| Error::Timeout)?
        .map_err(|err| {
            observe::scoring_failed(&err);
            Error::from(err)
        })?;
        for outcome in scored.iter().filter(|outcome| outcome.score <= 0.0) {
            observe::bid_discarded(&outcome.bid.group.id, DiscardReason::NonPositiveScore);
        }
        let Some(ranking) = selection::rank(&scored) else {
            return Err(Error::NoWinner);
        };
        let winner = &scored[ranking.winner];

        let id = self.ids.generate();
        if self.persistence.results.id_exists(id).await? {
            return Err(Error::Internal(format!("auction id {id} is already taken")));
        }
        let result = AuctionResult {
            id,
            render_uri: winner.bid.ad.render_uri.clone(),
            bid: winner.bid.bid,
            winner: winner.bid.group.id.clone(),
            bidding_logic_uri: winner.bid.group.bidding_logic_uri.clone(),
            bidding_logic: winner.bid.bidding_logic.clone(),
            buyer_contextual_signals: winner.bid.contextual_signals.clone(),
            seller_contextual_signals: Signals::from(json!({ "score": winner.score })),
            caller_package: dev.caller.clone(),
            created_at: Utc::now(),
        };
        let debug_reports = if self.config.debug_reporting.enabled {
            debug::finalize(&scored, &ranking, &config.seller)
        } else {
            Vec::new()
        };
        self.persistence.results.insert_result(&result).await?;

        Ok((
            Selection {
                id,
                render_uri: result.render_uri,
            },
            debug_reports,
        ))
    }

    /// Queues debug reports of the auction `id`. Failures don't affect the
    /// auction, its result is already persisted.
    async fn queue_debug_reports(&self, id: Id, uris: Vec<Url>) {
        if uris.is_empty() {
            return;
        }
        if let Err(err) = self
            .persistence
            .debug_reports
            .enqueue_debug_reports(uris)
            .await
        {
            observe::debug_reports_not_queued(id, &err);
        }
    }

    /// Bids with every group in parallel on the worker pool. Groups that
    /// fail, time out or don't bid are dropped. The surviving bids are
    /// returned in candidate order.
    async fn bid_all(
        &self,
        groups: Vec<CandidateGroup>,
        config: &Arc<AuctionConfig>,
        dev: &DevContext,
    ) -> Vec<BidOutcome> {
        let timeout = self.config.auction.bidding_timeout_per_group;
        let mut tasks = JoinSet::new();
        for (index, group) in groups.into_iter().enumerate() {
            let engine = self.bid_engine.clone();
            let workers = self.workers.clone();
            let config = config.clone();
            let dev = dev.clone();
            tasks.spawn(
                async move {
                    let Ok(_permit) = workers.acquire_owned().await else {
                        return (index, None);
                    };
                    let group = Arc::new(group);
                    let buyer_signals = config.buyer_signals(group.buyer());
                    let bid = engine.bid(
                        group.clone(),
                        &buyer_signals,
                        Signals::default(),
                        &config,
                        &dev,
                    );
                    let outcome = match tokio::time::timeout(timeout, bid).await {
                        Ok(Ok(Some(outcome))) => Some(outcome),
                        Ok(Ok(None)) => {
                            observe::bid_discarded(&group.id, DiscardReason::NoBid);
                            None
                        }
                        Ok(Err(err)) => {
                            observe::bidding_failed(&group.id, &err);
                            None
                        }
                        Err(_) => {
                            observe::bid_discarded(&group.id, DiscardReason::Timeout);
                            None
                        }
                    };
                    (index, outcome)
                }
                .in_current_span(),
            );
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Some(outcome))) => outcomes.push((index, outcome)),
                Ok((_, None)) => (),
                Err(err) => observe::bidding_task_failed(&err),
            }
        }
        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }
}
