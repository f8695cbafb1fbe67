use {
    crate::{
        domain::{Error, auction},
        infra::{id::MockIdGenerator, persistence::ResultStore},
        tests::setup::{BUYER_A, BUYER_B, CALLER, fakes, setup},
    },
    std::{sync::Arc, time::Duration},
};

#[tokio::test]
async fn highest_score_wins() {
    let setup = setup();
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[1.1, 2.2]);
    setup.group(BUYER_B, "shirts", "bid-from-metadata", &[4.5, 6.7, 10.0]);
    setup.seller("score-equals-bid");

    let selection = setup.win().await;

    assert_eq!(
        selection.render_uri.as_str(),
        "https://buyer-b.com/shirts/ad/2"
    );
    assert!(setup.store.id_exists(selection.id).await.unwrap());
    let result = setup.store.get_result(selection.id).await.unwrap().unwrap();
    assert_eq!(result.bid, 10.0);
    assert_eq!(result.caller_package, CALLER);
    assert_eq!(result.winner.buyer.as_str(), BUYER_B);
    assert_eq!(result.bidding_logic, "bid-from-metadata");
}

#[tokio::test]
async fn negative_scores_are_dropped_before_selection() {
    let setup = setup();
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[1.0, 2.0]);
    setup.group(BUYER_B, "shirts", "bid-from-metadata", &[3.0, 5.0, 7.0]);
    setup.seller("odd-bids-negative");

    let selection = setup.win().await;

    // The best ad of buyer B bids 7, which the seller scores negative.
    assert_eq!(
        selection.render_uri.as_str(),
        "https://buyer-a.com/shoes/ad/1"
    );
}

#[tokio::test]
async fn equal_scores_go_to_the_first_candidate() {
    let setup = setup();
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[3.0]);
    setup.group(BUYER_B, "shirts", "bid-from-metadata", &[3.0]);
    setup.seller("score-equals-bid");

    let selection = setup.win().await;
    assert_eq!(
        selection.render_uri.as_str(),
        "https://buyer-a.com/shoes/ad/0"
    );
}

#[tokio::test]
async fn no_positive_bids() {
    let setup = setup();
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[0.0, -1.0]);
    setup.group(BUYER_B, "shirts", "bid-from-metadata", &[]);
    setup.seller("score-equals-bid");

    let err = setup
        .orchestrator()
        .run_auction(setup.auction_config(), CALLER)
        .await
        .unwrap_err();

    assert_eq!(err, Error::NoValidBids);
    assert_eq!(setup.store.result_count(), 0);
}

#[tokio::test]
async fn no_positive_scores() {
    let setup = setup();
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[1.0]);
    setup.group(BUYER_B, "shirts", "bid-from-metadata", &[2.0]);
    setup.seller("all-negative");

    let err = setup
        .orchestrator()
        .run_auction(setup.auction_config(), CALLER)
        .await
        .unwrap_err();

    assert_eq!(err, Error::NoWinner);
    assert_eq!(setup.store.result_count(), 0);
}

#[tokio::test]
async fn no_candidates() {
    let setup = setup();
    setup.group("other-buyer.com", "shoes", "bid-from-metadata", &[1.0]);
    setup.seller("score-equals-bid");

    let err = setup
        .orchestrator()
        .run_auction(setup.auction_config(), CALLER)
        .await
        .unwrap_err();
    assert_eq!(err, Error::NoCandidates);
}

#[tokio::test]
async fn failing_groups_are_dropped() {
    let setup = setup();
    setup.group(BUYER_A, "shoes", "not-a-script", &[100.0]);
    setup.group(BUYER_B, "shirts", "bid-from-metadata", &[2.0]);
    setup.seller("score-equals-bid");

    let selection = setup.win().await;
    assert_eq!(
        selection.render_uri.as_str(),
        "https://buyer-b.com/shirts/ad/0"
    );
}

#[tokio::test(start_paused = true)]
async fn slow_groups_are_dropped() {
    let mut setup = setup();
    setup.config.auction.bidding_timeout_per_group = Duration::from_secs(1);
    setup.group(BUYER_A, "shoes", "slow-bid", &[100.0]);
    setup.group(BUYER_B, "shirts", "bid-from-metadata", &[2.0]);
    setup.seller("score-equals-bid");

    let selection = setup.win().await;
    assert_eq!(
        selection.render_uri.as_str(),
        "https://buyer-b.com/shirts/ad/0"
    );
}

#[tokio::test]
async fn scoring_errors_are_internal() {
    let setup = setup();
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[1.0]);
    setup.seller("broken-score");

    let err = setup
        .orchestrator()
        .run_auction(setup.auction_config(), CALLER)
        .await
        .unwrap_err();

    assert_eq!(err, Error::Internal("score is not a number".into()));
    assert_eq!(setup.store.result_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn overall_deadline() {
    let mut setup = setup();
    setup.config.auction.overall_timeout = Duration::from_secs(5);
    setup.config.auction.scoring_timeout = Duration::from_secs(120);
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[1.0]);
    setup.seller("slow-score");

    let err = setup
        .orchestrator()
        .run_auction(setup.auction_config(), CALLER)
        .await
        .unwrap_err();
    assert_eq!(err, Error::Timeout);

    // Abandoned work never persists a result.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(setup.store.result_count(), 0);
    assert!(!setup.store.id_exists(auction::Id(1)).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn scoring_deadline() {
    let mut setup = setup();
    setup.config.auction.scoring_timeout = Duration::from_secs(1);
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[1.0]);
    setup.seller("slow-score");

    let err = setup
        .orchestrator()
        .run_auction(setup.auction_config(), CALLER)
        .await
        .unwrap_err();
    assert_eq!(err, Error::Timeout);
}

#[tokio::test]
async fn revoked_consent_is_a_silent_success() {
    let mut setup = setup();
    setup.device.consent_revoked = true;
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[1.0]);
    setup.seller("score-equals-bid");

    let selection = setup
        .orchestrator()
        .run_auction(setup.auction_config(), CALLER)
        .await
        .unwrap();

    assert_eq!(selection, None);
    assert_eq!(setup.store.result_count(), 0);
    assert!(setup.http.fetches().is_empty());
}

#[tokio::test]
async fn background_callers_are_rejected() {
    let mut setup = setup();
    setup.device.foreground = false;
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[1.0]);
    setup.seller("score-equals-bid");

    let err = setup
        .orchestrator()
        .run_auction(setup.auction_config(), CALLER)
        .await
        .unwrap_err();

    assert_eq!(err, Error::BackgroundCaller);
    assert!(setup.http.fetches().is_empty());
}

#[tokio::test]
async fn rate_limited_callers_are_rejected() {
    let mut setup = setup();
    setup.config.throttle.run_auction = 1.0;
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[1.0]);
    setup.seller("score-equals-bid");
    let orchestrator = setup.orchestrator();

    assert!(
        orchestrator
            .run_auction(setup.auction_config(), CALLER)
            .await
            .is_ok()
    );
    let err = orchestrator
        .run_auction(setup.auction_config(), CALLER)
        .await
        .unwrap_err();
    assert_eq!(err, Error::RateLimited);
    assert_eq!(setup.store.result_count(), 1);
}

#[tokio::test]
async fn decision_logic_of_another_host_is_rejected() {
    let setup = setup();
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[1.0]);
    let mut config = setup.auction_config();
    config.decision_logic_uri = "https://elsewhere.com/decide.js".parse().unwrap();

    let err = setup
        .orchestrator()
        .run_auction(config, CALLER)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn debug_reports_are_queued() {
    let mut setup = setup();
    setup.config.debug_reporting.enabled = true;
    setup.group(BUYER_A, "shoes", "bid-with-debug", &[1.0]);
    setup.group(BUYER_B, "shirts", "bid-with-debug", &[4.0]);
    setup.seller("score-equals-bid");

    setup.win().await;

    let queued: Vec<_> = setup
        .store
        .queued_debug_reports()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        queued,
        vec![
            "https://buyer-a.com/debug/loss?winner=4",
            "https://buyer-b.com/debug/win?bid=4",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn slow_debug_report_queue_does_not_fail_the_auction() {
    let mut setup = setup();
    setup.config.auction.overall_timeout = Duration::from_secs(5);
    setup.config.debug_reporting.enabled = true;
    setup.debug_reports = Some(Arc::new(fakes::SlowDebugReports(Duration::from_secs(60))));
    setup.group(BUYER_A, "shoes", "bid-with-debug", &[1.0]);
    setup.group(BUYER_B, "shirts", "bid-with-debug", &[4.0]);
    setup.seller("score-equals-bid");

    let selection = setup.win().await;

    // The reply and the store agree on the winner.
    assert_eq!(setup.store.result_count(), 1);
    assert!(setup.store.id_exists(selection.id).await.unwrap());
}

#[tokio::test]
async fn taken_auction_ids_are_internal_errors() {
    let mut setup = setup();
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[1.0]);
    setup.seller("score-equals-bid");
    let taken = setup.win().await.id;
    let original = setup.store.get_result(taken).await.unwrap().unwrap();

    setup.group(BUYER_B, "shirts", "bid-from-metadata", &[5.0]);
    let mut ids = MockIdGenerator::new();
    ids.expect_generate().times(1).returning(move || taken);
    setup.ids = Arc::new(ids);

    let err = setup
        .orchestrator()
        .run_auction(setup.auction_config(), CALLER)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Internal(_)));
    assert_eq!(setup.store.result_count(), 1);
    assert_eq!(
        setup.store.get_result(taken).await.unwrap().unwrap(),
        original
    );
}
