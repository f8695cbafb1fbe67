use crate::{
    domain::{
        Error,
        auction,
        reporting::impression::{CALLER_PACKAGE_MISMATCH, UNKNOWN_AUCTION_ID},
    },
    tests::setup::{BUYER_A, BUYER_B, CALLER, setup},
};

#[tokio::test]
async fn reports_to_seller_and_buyer() {
    let setup = setup();
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[1.0]);
    setup.group(BUYER_B, "shirts", "bid-from-metadata", &[3.0]);
    setup.seller("score-equals-bid");
    let selection = setup.win().await;

    let deliveries = setup
        .impression_reporter()
        .report_impression(selection.id, &setup.auction_config(), CALLER)
        .await
        .unwrap();
    assert_eq!(deliveries.len(), 2);
    deliveries.finished().await;

    let notified = setup.http.notified();
    assert_eq!(notified.len(), 2);
    assert_eq!(notified[0], "https://buyer-b.com/report");
    assert!(notified[1].starts_with("https://seller.com/report?bid=3"));
    // Impressions are plain pings without a body.
    assert!(setup.http.notifications().iter().all(|(_, body)| body.is_none()));
    // Registration of interactions is disabled by default.
    assert_eq!(setup.store.interaction_count(selection.id), 0);
}

#[tokio::test]
async fn registers_interactions_of_seller_and_buyer() {
    let mut setup = setup();
    setup.config.reporting.register_ad_beacon_enabled = true;
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[1.0]);
    setup.seller("score-equals-bid");
    let selection = setup.win().await;

    setup
        .impression_reporter()
        .report_impression(selection.id, &setup.auction_config(), CALLER)
        .await
        .unwrap()
        .finished()
        .await;

    // The buyer's `view` interaction points to a foreign host and is skipped.
    assert_eq!(setup.store.interaction_count(selection.id), 2);
}

#[tokio::test]
async fn unknown_auction() {
    let setup = setup();
    setup.seller("score-equals-bid");

    let err = setup
        .impression_reporter()
        .report_impression(auction::Id(42), &setup.auction_config(), CALLER)
        .await
        .unwrap_err();
    assert_eq!(err, Error::InvalidArgument(UNKNOWN_AUCTION_ID.into()));
    assert!(setup.http.notifications().is_empty());
}

#[tokio::test]
async fn auction_of_another_caller() {
    let setup = setup();
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[1.0]);
    setup.seller("score-equals-bid");
    let selection = setup.win().await;

    let err = setup
        .impression_reporter()
        .report_impression(selection.id, &setup.auction_config(), "com.other.app")
        .await
        .unwrap_err();
    assert_eq!(err, Error::InvalidArgument(CALLER_PACKAGE_MISMATCH.into()));
}

#[tokio::test]
async fn malformed_reporting_result() {
    let setup = setup();
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[1.0]);
    setup.seller("malformed-report");
    let selection = setup.win().await;

    let err = setup
        .impression_reporter()
        .report_impression(selection.id, &setup.auction_config(), CALLER)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Internal(_)));
    assert!(setup.http.notifications().is_empty());
}

#[tokio::test]
async fn failed_notifications_do_not_fail_the_report() {
    let setup = setup();
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[1.0]);
    setup.seller("score-equals-bid");
    let selection = setup.win().await;
    setup.http.fail("https://buyer-a.com/report");

    let deliveries = setup
        .impression_reporter()
        .report_impression(selection.id, &setup.auction_config(), CALLER)
        .await
        .unwrap();
    deliveries.finished().await;

    assert_eq!(setup.http.notified().len(), 2);
}

#[tokio::test]
async fn unenrolled_buyers_are_not_notified() {
    let mut setup = setup();
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[1.0]);
    setup.seller("score-equals-bid");
    let selection = setup.win().await;
    setup.device.unenrolled.insert(BUYER_A.into());

    setup
        .impression_reporter()
        .report_impression(selection.id, &setup.auction_config(), CALLER)
        .await
        .unwrap()
        .finished()
        .await;

    let notified = setup.http.notified();
    assert_eq!(notified.len(), 1);
    assert!(notified[0].starts_with("https://seller.com/report"));
}

#[tokio::test]
async fn revoked_consent_reports_nothing() {
    let mut setup = setup();
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[1.0]);
    setup.seller("score-equals-bid");
    let selection = setup.win().await;
    setup.device.consent_revoked = true;

    let deliveries = setup
        .impression_reporter()
        .report_impression(selection.id, &setup.auction_config(), CALLER)
        .await
        .unwrap();
    assert!(deliveries.is_empty());
    assert!(setup.http.notifications().is_empty());
}
