use crate::{
    domain::Error,
    tests::setup::{BUYER_A, CALLER, setup},
};

#[tokio::test]
async fn decision_logic_override_in_developer_mode() {
    let mut setup = setup();
    setup.device.developer_mode = true;
    // The seller serves no decision logic, only the override provides it.
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[1.0]);
    setup
        .override_manager()
        .override_auction(
            &setup.auction_config(),
            CALLER,
            "score-equals-bid".into(),
            None,
            Default::default(),
        )
        .await
        .unwrap();

    let selection = setup.win().await;
    assert_eq!(
        selection.render_uri.as_str(),
        "https://buyer-a.com/shoes/ad/0"
    );
}

#[tokio::test]
async fn overrides_are_ignored_outside_developer_mode() {
    let mut setup = setup();
    setup.device.developer_mode = true;
    setup.group(BUYER_A, "shoes", "bid-from-metadata", &[1.0]);
    setup
        .override_manager()
        .override_auction(
            &setup.auction_config(),
            CALLER,
            "score-equals-bid".into(),
            None,
            Default::default(),
        )
        .await
        .unwrap();
    setup.device.developer_mode = false;

    let err = setup
        .orchestrator()
        .run_auction(setup.auction_config(), CALLER)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Internal(_)));
}
