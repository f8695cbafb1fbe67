//! Post-auction reporting: impressions, interactions and debug reports.

use {
    crate::{
        domain::auction,
        infra::{HttpClient, observe},
    },
    futures::future::join_all,
    serde::{Deserialize, Serialize},
    std::sync::Arc,
    strum::{Display, IntoStaticStr},
    tokio::task::JoinHandle,
    url::Url,
};

pub mod debug;
pub mod impression;
pub mod interaction;

pub use {
    debug::DebugReportSender,
    impression::ImpressionReporter,
    interaction::InteractionReporter,
};

/// Party receiving a report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, IntoStaticStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
pub enum Destination {
    Seller,
    Buyer,
}

impl Destination {
    const fn bit(self) -> u8 {
        match self {
            Self::Seller => 1,
            Self::Buyer => 2,
        }
    }
}

/// Bitmask of destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Destinations(u8);

impl Destinations {
    pub const BUYER: Self = Self(Destination::Buyer.bit());
    pub const SELLER: Self = Self(Destination::Seller.bit());
    const ALL: u8 = Self::SELLER.0 | Self::BUYER.0;

    /// Parses a raw bitmask. Empty masks and unknown bits are rejected.
    pub fn from_bits(bits: u8) -> Option<Self> {
        (bits != 0 && bits & !Self::ALL == 0).then_some(Self(bits))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, destination: Destination) -> bool {
        self.0 & destination.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = Destination> {
        [Destination::Seller, Destination::Buyer]
            .into_iter()
            .filter(move |destination| self.contains(*destination))
    }
}

impl std::ops::BitOr for Destinations {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl From<Destination> for Destinations {
    fn from(destination: Destination) -> Self {
        Self(destination.bit())
    }
}

/// An interaction reporting URI registered by reporting logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredInteraction {
    pub auction_id: auction::Id,
    pub key: String,
    pub destination: Destination,
    pub uri: Url,
}

/// Notifications still in flight after a reporting call replied. Dropping
/// the handle does not cancel them.
#[derive(Debug, Default)]
#[must_use = "dropping deliveries detaches them, use `finished` to wait for them"]
pub struct Deliveries(Vec<JoinHandle<()>>);

impl Deliveries {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Waits until every notification was attempted.
    pub async fn finished(self) {
        for result in join_all(self.0).await {
            if let Err(err) = result {
                observe::delivery_task_failed(&err);
            }
        }
    }

    fn push(&mut self, handle: JoinHandle<()>) {
        self.0.push(handle);
    }
}

/// Sends one best-effort notification on its own task. Failures are logged
/// and never retried.
fn deliver(
    http: Arc<dyn HttpClient>,
    kind: observe::Report,
    destination: Destination,
    uri: Url,
    body: Option<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match http.notify(&uri, body).await {
            Ok(()) => observe::notification_sent(kind, destination, &uri),
            Err(err) => observe::notification_failed(kind, destination, &uri, &err),
        }
    })
}
