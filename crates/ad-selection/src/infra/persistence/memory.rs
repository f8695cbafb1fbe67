use {
    super::{CandidateStore, DebugReportStore, Error, OverrideStore, ResultStore},
    crate::domain::{
        auction::{self, AdTechIdentifier, AuctionResult},
        candidate::{CandidateGroup, GroupRef},
        overrides::{AuctionOverride, Fingerprint, GroupOverride},
        reporting::{Destination, RegisteredInteraction},
    },
    chrono::{DateTime, Utc},
    std::{
        collections::{BTreeMap, HashMap, VecDeque},
        sync::{Mutex, MutexGuard, PoisonError},
    },
    url::Url,
};

/// Store keeping everything in process memory. Every operation holds one
/// lock, which makes each of them atomic.
#[derive(Debug, Default)]
pub struct InMemory {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    results: HashMap<auction::Id, AuctionResult>,
    interactions: HashMap<auction::Id, BTreeMap<(Destination, String), Url>>,
    groups: Vec<CandidateGroup>,
    auction_overrides: HashMap<(Fingerprint, String), AuctionOverride>,
    group_overrides: HashMap<(GroupRef, String), GroupOverride>,
    debug_reports: VecDeque<Url>,
}

impl InMemory {
    /// Adds a candidate group, replacing one with the same identity.
    pub fn join_group(&self, group: CandidateGroup) {
        let mut state = self.state();
        match state.groups.iter_mut().find(|g| g.id == group.id) {
            Some(existing) => *existing = group,
            None => state.groups.push(group),
        }
    }

    pub fn result_count(&self) -> usize {
        self.state().results.len()
    }

    pub fn interaction_count(&self, id: auction::Id) -> usize {
        self.state().interactions.get(&id).map_or(0, BTreeMap::len)
    }

    pub fn queued_debug_reports(&self) -> Vec<Url> {
        self.state().debug_reports.iter().cloned().collect()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl ResultStore for InMemory {
    async fn insert_result(&self, result: &AuctionResult) -> Result<(), Error> {
        let mut state = self.state();
        if state.results.contains_key(&result.id) {
            return Err(Error::DuplicateId(result.id));
        }
        state.results.insert(result.id, result.clone());
        Ok(())
    }

    async fn get_result(&self, id: auction::Id) -> Result<Option<AuctionResult>, Error> {
        Ok(self.state().results.get(&id).cloned())
    }

    async fn id_exists(&self, id: auction::Id) -> Result<bool, Error> {
        Ok(self.state().results.contains_key(&id))
    }

    async fn id_exists_for_caller(&self, id: auction::Id, caller: &str) -> Result<bool, Error> {
        Ok(self
            .state()
            .results
            .get(&id)
            .is_some_and(|result| result.caller_package == caller))
    }

    async fn insert_interactions(
        &self,
        id: auction::Id,
        interactions: &[RegisteredInteraction],
        total_cap: usize,
        per_destination_cap: usize,
        destination: Destination,
    ) -> Result<usize, Error> {
        let mut state = self.state();
        if !state.results.contains_key(&id) {
            return Err(Error::Storage(format!(
                "no auction {id} to register interactions for"
            )));
        }
        let rows = state.interactions.entry(id).or_default();
        let stored_for_destination = rows.keys().filter(|(d, _)| *d == destination).count();
        let remaining = total_cap
            .saturating_sub(rows.len())
            .min(per_destination_cap.saturating_sub(stored_for_destination))
            .min(interactions.len());
        let before = rows.len();
        for interaction in interactions.iter().take(remaining) {
            rows.insert(
                (destination, interaction.key.clone()),
                interaction.uri.clone(),
            );
        }
        Ok(rows.len() - before)
    }

    async fn interaction_uri(
        &self,
        id: auction::Id,
        key: &str,
        destination: Destination,
    ) -> Result<Option<Url>, Error> {
        Ok(self
            .state()
            .interactions
            .get(&id)
            .and_then(|rows| rows.get(&(destination, key.to_owned())))
            .cloned())
    }

    async fn delete_results(&self, ids: &[auction::Id]) -> Result<(), Error> {
        let mut state = self.state();
        for id in ids {
            state.results.remove(id);
            state.interactions.remove(id);
        }
        Ok(())
    }

    async fn results_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<auction::Id>, Error> {
        let mut ids: Vec<_> = self
            .state()
            .results
            .values()
            .filter(|result| result.created_at < cutoff)
            .map(|result| result.id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait::async_trait]
impl CandidateStore for InMemory {
    async fn candidates(
        &self,
        buyers: &[AdTechIdentifier],
    ) -> Result<Vec<CandidateGroup>, Error> {
        Ok(self
            .state()
            .groups
            .iter()
            .filter(|group| buyers.contains(group.buyer()))
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl OverrideStore for InMemory {
    async fn put_auction_override(&self, entry: AuctionOverride) -> Result<(), Error> {
        let key = (entry.fingerprint.clone(), entry.caller_package.clone());
        self.state().auction_overrides.insert(key, entry);
        Ok(())
    }

    async fn auction_override(
        &self,
        fingerprint: &Fingerprint,
        caller: &str,
    ) -> Result<Option<AuctionOverride>, Error> {
        Ok(self
            .state()
            .auction_overrides
            .get(&(fingerprint.clone(), caller.to_owned()))
            .cloned())
    }

    async fn remove_auction_override(
        &self,
        fingerprint: &Fingerprint,
        caller: &str,
    ) -> Result<(), Error> {
        self.state()
            .auction_overrides
            .remove(&(fingerprint.clone(), caller.to_owned()));
        Ok(())
    }

    async fn put_group_override(&self, entry: GroupOverride) -> Result<(), Error> {
        let key = (entry.group.clone(), entry.caller_package.clone());
        self.state().group_overrides.insert(key, entry);
        Ok(())
    }

    async fn group_override(
        &self,
        group: &GroupRef,
        caller: &str,
    ) -> Result<Option<GroupOverride>, Error> {
        Ok(self
            .state()
            .group_overrides
            .get(&(group.clone(), caller.to_owned()))
            .cloned())
    }

    async fn remove_group_override(&self, group: &GroupRef, caller: &str) -> Result<(), Error> {
        self.state()
            .group_overrides
            .remove(&(group.clone(), caller.to_owned()));
        Ok(())
    }

    async fn remove_all_overrides(&self, caller: &str) -> Result<(), Error> {
        let mut state = self.state();
        state
            .auction_overrides
            .retain(|(_, package), _| package != caller);
        state
            .group_overrides
            .retain(|(_, package), _| package != caller);
        Ok(())
    }
}

#[async_trait::async_trait]
impl DebugReportStore for InMemory {
    async fn enqueue_debug_reports(&self, uris: Vec<Url>) -> Result<(), Error> {
        self.state().debug_reports.extend(uris);
        Ok(())
    }

    async fn take_debug_reports(&self, limit: usize) -> Result<Vec<Url>, Error> {
        let mut state = self.state();
        let count = limit.min(state.debug_reports.len());
        Ok(state.debug_reports.drain(..count).collect())
    }
}
