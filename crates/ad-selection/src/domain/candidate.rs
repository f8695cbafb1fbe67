use {
    crate::domain::auction::{AdTechIdentifier, Signals},
    serde::{Deserialize, Serialize},
    serde_json::{Value, json},
    url::Url,
};

/// An ad a candidate group can bid with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ad {
    pub render_uri: Url,
    #[serde(default)]
    pub metadata: Value,
}

/// Where to fetch real time signals for bidding, and which keys to ask for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedBiddingData {
    pub uri: Url,
    pub keys: Vec<String>,
}

impl TrustedBiddingData {
    /// The lookup URL, `<uri>?keys=k1,k2`.
    pub fn lookup_url(&self) -> Url {
        let mut url = self.uri.clone();
        if !self.keys.is_empty() {
            url.query_pairs_mut()
                .append_pair("keys", &self.keys.join(","));
        }
        url
    }
}

/// Identity of a candidate group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupRef {
    /// Package of the app that joined the group.
    pub owner: String,
    pub buyer: AdTechIdentifier,
    pub name: String,
}

impl std::fmt::Display for GroupRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.owner, self.buyer, self.name)
    }
}

/// A named, buyer-owned set of ads that bids in auctions (a custom audience).
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateGroup {
    pub id: GroupRef,
    pub bidding_logic_uri: Url,
    pub trusted_bidding_data: Option<TrustedBiddingData>,
    pub user_bidding_signals: Signals,
    pub ads: Vec<Ad>,
}

impl CandidateGroup {
    pub fn buyer(&self) -> &AdTechIdentifier {
        &self.id.buyer
    }

    /// Description of the group handed to bidding and reporting logic.
    pub fn signals(&self) -> Value {
        json!({
            "owner": self.id.owner,
            "buyer": self.id.buyer,
            "name": self.id.name,
        })
    }
}
