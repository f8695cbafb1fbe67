use {
    crate::domain::{Error, candidate::GroupRef},
    chrono::{DateTime, Utc},
    derive_more::{Display, From, Into},
    serde::{Deserialize, Serialize},
    serde_json::Value,
    std::collections::BTreeMap,
    url::Url,
};

pub mod orchestrator;
pub mod selection;

pub use orchestrator::{Orchestrator, Selection};

/// Identifier of a completed auction. Generated once the winner is known.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Into, Serialize, Deserialize,
)]
pub struct Id(pub u64);

/// An ad tech taking part in auctions as buyer or seller, identified by its
/// host name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdTechIdentifier(String);

impl AdTechIdentifier {
    pub fn new(host: impl Into<String>) -> Self {
        Self(host.into().to_ascii_lowercase())
    }

    pub fn from_uri(uri: &Url) -> Option<Self> {
        uri.host_str().map(Self::new)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `uri` is served over https by this ad tech, from its host or a
    /// subdomain of it.
    pub fn owns(&self, uri: &Url) -> bool {
        if uri.scheme() != "https" {
            return false;
        }
        let Some(host) = uri.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        host == self.0
            || host
                .strip_suffix(self.0.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    }
}

impl From<&str> for AdTechIdentifier {
    fn from(host: &str) -> Self {
        Self::new(host)
    }
}

/// Opaque JSON passed through to ad tech logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From, Into)]
#[serde(transparent)]
pub struct Signals(Value);

impl Signals {
    pub fn as_json(&self) -> &Value {
        &self.0
    }

    /// Parses signals served by an ad tech.
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body).map(Self)
    }
}

impl Default for Signals {
    fn default() -> Self {
        Self(Value::Object(Default::default()))
    }
}

/// What the seller asks for when running an auction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionConfig {
    pub seller: AdTechIdentifier,
    pub decision_logic_uri: Url,
    pub buyers: Vec<AdTechIdentifier>,
    #[serde(default)]
    pub auction_signals: Signals,
    #[serde(default)]
    pub seller_signals: Signals,
    #[serde(default)]
    pub per_buyer_signals: BTreeMap<AdTechIdentifier, Signals>,
    #[serde(default)]
    pub trusted_scoring_signals_uri: Option<Url>,
}

impl AuctionConfig {
    /// Checks the config is consistent before any work starts.
    pub fn validate(&self) -> Result<(), Error> {
        if self.seller.as_str().is_empty() {
            return Err(Error::InvalidArgument("seller must not be empty".into()));
        }
        if !self.seller.owns(&self.decision_logic_uri) {
            return Err(Error::InvalidArgument(format!(
                "decision logic uri {} does not belong to seller {}",
                self.decision_logic_uri, self.seller
            )));
        }
        if let Some(uri) = &self.trusted_scoring_signals_uri {
            if !self.seller.owns(uri) {
                return Err(Error::InvalidArgument(format!(
                    "trusted scoring signals uri {uri} does not belong to seller {}",
                    self.seller
                )));
            }
        }
        Ok(())
    }

    pub fn buyer_signals(&self, buyer: &AdTechIdentifier) -> Signals {
        self.per_buyer_signals
            .get(buyer)
            .cloned()
            .unwrap_or_default()
    }
}

/// The persisted outcome of a successful auction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionResult {
    pub id: Id,
    pub render_uri: Url,
    pub bid: f64,
    pub winner: GroupRef,
    pub bidding_logic_uri: Url,
    /// Buyer logic that produced the winning bid, reused for win reporting.
    pub bidding_logic: String,
    pub buyer_contextual_signals: Signals,
    pub seller_contextual_signals: Signals,
    pub caller_package: String,
    pub created_at: DateTime<Utc>,
}
