//! Developer overrides: literal logic and signals that replace what would be
//! fetched from ad techs. Only consulted for callers in developer mode.

use {
    crate::{
        domain::{
            Error,
            auction::{AdTechIdentifier, AuctionConfig, Signals},
            candidate::GroupRef,
            filter::{self, RequestFilter},
        },
        infra::{Platform, observe, persistence::OverrideStore, throttle::Api},
    },
    derive_more::Display,
    serde::{Deserialize, Serialize},
    sha2::{Digest, Sha256},
    std::{collections::BTreeMap, sync::Arc},
};

/// Deterministic digest of an auction config and the calling package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// SHA-256 over the canonical JSON of `config` followed by `caller`. JSON
    /// objects serialize with sorted keys, so equal configs hash equally.
    pub fn new(config: &AuctionConfig, caller: &str) -> Result<Self, Error> {
        let json = serde_json::to_vec(config)
            .map_err(|err| Error::Internal(format!("cannot fingerprint config: {err}")))?;
        let mut hasher = Sha256::new();
        hasher.update(&json);
        hasher.update(caller.as_bytes());
        Ok(Self(hex::encode(hasher.finalize())))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuctionOverride {
    pub fingerprint: Fingerprint,
    pub caller_package: String,
    pub decision_logic: String,
    pub trusted_scoring_signals: Option<Signals>,
    /// Reporting logic per buyer, used when the result has no logic stored.
    pub buyer_reporting_logic: BTreeMap<AdTechIdentifier, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupOverride {
    pub group: GroupRef,
    pub caller_package: String,
    pub bidding_logic: String,
    pub trusted_bidding_signals: Option<Signals>,
}

/// The calling package and whether overrides apply to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevContext {
    pub caller: String,
    pub developer_mode: bool,
}

impl DevContext {
    pub fn new(caller: &str, platform: &dyn Platform) -> Self {
        Self {
            caller: caller.to_owned(),
            developer_mode: platform.is_developer_mode_enabled(caller),
        }
    }
}

/// Read side of the overrides used while running auctions and reporting.
/// Lookup failures are logged and treated as "no override".
#[derive(Clone)]
pub struct DevOverrides {
    store: Arc<dyn OverrideStore>,
}

impl DevOverrides {
    pub fn new(store: Arc<dyn OverrideStore>) -> Self {
        Self { store }
    }

    pub async fn auction(
        &self,
        config: &AuctionConfig,
        dev: &DevContext,
    ) -> Option<AuctionOverride> {
        if !dev.developer_mode {
            return None;
        }
        let fingerprint = Fingerprint::new(config, &dev.caller).ok()?;
        match self.store.auction_override(&fingerprint, &dev.caller).await {
            Ok(entry) => entry,
            Err(err) => {
                observe::override_lookup_failed(&dev.caller, &err);
                None
            }
        }
    }

    pub async fn group(&self, group: &GroupRef, dev: &DevContext) -> Option<GroupOverride> {
        if !dev.developer_mode {
            return None;
        }
        match self.store.group_override(group, &dev.caller).await {
            Ok(entry) => entry,
            Err(err) => {
                observe::override_lookup_failed(&dev.caller, &err);
                None
            }
        }
    }
}

/// Override CRUD for apps in developer mode.
pub struct OverrideManager {
    store: Arc<dyn OverrideStore>,
    platform: Arc<dyn Platform>,
    filter: Arc<RequestFilter>,
}

impl OverrideManager {
    pub fn new(
        store: Arc<dyn OverrideStore>,
        platform: Arc<dyn Platform>,
        filter: Arc<RequestFilter>,
    ) -> Self {
        Self {
            store,
            platform,
            filter,
        }
    }

    pub async fn override_auction(
        &self,
        config: &AuctionConfig,
        caller: &str,
        decision_logic: String,
        trusted_scoring_signals: Option<Signals>,
        buyer_reporting_logic: BTreeMap<AdTechIdentifier, String>,
    ) -> Result<(), Error> {
        self.authorize(caller)?;
        let entry = AuctionOverride {
            fingerprint: Fingerprint::new(config, caller)?,
            caller_package: caller.to_owned(),
            decision_logic,
            trusted_scoring_signals,
            buyer_reporting_logic,
        };
        self.store.put_auction_override(entry).await?;
        observe::override_added(caller, "auction");
        Ok(())
    }

    pub async fn remove_auction_override(
        &self,
        config: &AuctionConfig,
        caller: &str,
    ) -> Result<(), Error> {
        self.authorize(caller)?;
        let fingerprint = Fingerprint::new(config, caller)?;
        self.store
            .remove_auction_override(&fingerprint, caller)
            .await?;
        observe::override_removed(caller, "auction");
        Ok(())
    }

    pub async fn override_group(
        &self,
        group: GroupRef,
        caller: &str,
        bidding_logic: String,
        trusted_bidding_signals: Option<Signals>,
    ) -> Result<(), Error> {
        self.authorize(caller)?;
        let entry = GroupOverride {
            group,
            caller_package: caller.to_owned(),
            bidding_logic,
            trusted_bidding_signals,
        };
        self.store.put_group_override(entry).await?;
        observe::override_added(caller, "group");
        Ok(())
    }

    pub async fn remove_group_override(&self, group: &GroupRef, caller: &str) -> Result<(), Error> {
        self.authorize(caller)?;
        self.store.remove_group_override(group, caller).await?;
        observe::override_removed(caller, "group");
        Ok(())
    }

    /// Removes every override the caller added.
    pub async fn reset(&self, caller: &str) -> Result<(), Error> {
        self.authorize(caller)?;
        self.store.remove_all_overrides(caller).await?;
        observe::override_removed(caller, "all");
        Ok(())
    }

    fn authorize(&self, caller: &str) -> Result<(), Error> {
        self.filter.filter(&filter::Request {
            api: Api::Overrides,
            caller,
            ad_tech: None,
            enforce_foreground: false,
            enforce_consent: false,
        })?;
        if !self.platform.is_developer_mode_enabled(caller) {
            return Err(Error::Unauthorized(
                "developer mode is not enabled for the caller".into(),
            ));
        }
        Ok(())
    }
}
