//! Repository interfaces over auction results, registered interactions,
//! candidate groups, developer overrides and queued debug reports.

use {
    crate::domain::{
        auction::{self, AdTechIdentifier, AuctionResult},
        candidate::{CandidateGroup, GroupRef},
        overrides::{AuctionOverride, Fingerprint, GroupOverride},
        reporting::{Destination, RegisteredInteraction},
    },
    chrono::{DateTime, Utc},
    std::sync::Arc,
    thiserror::Error,
    url::Url,
};

pub mod memory;

pub use memory::InMemory;

#[derive(Debug, Error)]
pub enum Error {
    #[error("auction {0} is already persisted")]
    DuplicateId(auction::Id),
    #[error("storage failure: {0}")]
    Storage(String),
}

#[async_trait::async_trait]
pub trait ResultStore: Send + Sync {
    /// Atomically persists a new result. Fails if the id is taken.
    async fn insert_result(&self, result: &AuctionResult) -> Result<(), Error>;

    async fn get_result(&self, id: auction::Id) -> Result<Option<AuctionResult>, Error>;

    async fn id_exists(&self, id: auction::Id) -> Result<bool, Error>;

    /// Whether `id` exists and was created by `caller`.
    async fn id_exists_for_caller(&self, id: auction::Id, caller: &str) -> Result<bool, Error>;

    /// Persists interactions registered for `destination`. Commits at most
    /// as many rows as both caps still allow and returns how many rows were
    /// added. An interaction with the same key replaces the stored one.
    async fn insert_interactions(
        &self,
        id: auction::Id,
        interactions: &[RegisteredInteraction],
        total_cap: usize,
        per_destination_cap: usize,
        destination: Destination,
    ) -> Result<usize, Error>;

    async fn interaction_uri(
        &self,
        id: auction::Id,
        key: &str,
        destination: Destination,
    ) -> Result<Option<Url>, Error>;

    /// Deletes results together with their registered interactions.
    async fn delete_results(&self, ids: &[auction::Id]) -> Result<(), Error>;

    async fn results_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<auction::Id>, Error>;
}

#[async_trait::async_trait]
pub trait CandidateStore: Send + Sync {
    /// Groups of the given buyers, in a stable order.
    async fn candidates(&self, buyers: &[AdTechIdentifier])
    -> Result<Vec<CandidateGroup>, Error>;
}

#[async_trait::async_trait]
pub trait OverrideStore: Send + Sync {
    async fn put_auction_override(&self, entry: AuctionOverride) -> Result<(), Error>;

    async fn auction_override(
        &self,
        fingerprint: &Fingerprint,
        caller: &str,
    ) -> Result<Option<AuctionOverride>, Error>;

    async fn remove_auction_override(
        &self,
        fingerprint: &Fingerprint,
        caller: &str,
    ) -> Result<(), Error>;

    async fn put_group_override(&self, entry: GroupOverride) -> Result<(), Error>;

    async fn group_override(
        &self,
        group: &GroupRef,
        caller: &str,
    ) -> Result<Option<GroupOverride>, Error>;

    async fn remove_group_override(&self, group: &GroupRef, caller: &str) -> Result<(), Error>;

    /// Removes every override of `caller`, both kinds.
    async fn remove_all_overrides(&self, caller: &str) -> Result<(), Error>;
}

#[async_trait::async_trait]
pub trait DebugReportStore: Send + Sync {
    async fn enqueue_debug_reports(&self, uris: Vec<Url>) -> Result<(), Error>;

    /// Removes and returns up to `limit` of the oldest queued reports.
    async fn take_debug_reports(&self, limit: usize) -> Result<Vec<Url>, Error>;
}

/// The repositories components are built with.
#[derive(Clone)]
pub struct Persistence {
    pub results: Arc<dyn ResultStore>,
    pub candidates: Arc<dyn CandidateStore>,
    pub overrides: Arc<dyn OverrideStore>,
    pub debug_reports: Arc<dyn DebugReportStore>,
}

impl Persistence {
    /// All repositories backed by one shared in-memory store.
    pub fn in_memory(store: Arc<InMemory>) -> Self {
        Self {
            results: store.clone(),
            candidates: store.clone(),
            overrides: store.clone(),
            debug_reports: store,
        }
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence").finish_non_exhaustive()
    }
}
