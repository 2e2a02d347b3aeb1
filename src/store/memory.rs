use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rocket::tokio::{
    self,
    sync::{Mutex, MutexGuard},
};

use crate::model::{
    db::{
        candidate::{Candidate, NewCandidate},
        category::{Category, NewCategory},
        identity::{Identity, Uid},
        settings::{VotingStatus, VOTING_STATUS_ID},
    },
    mongodb::Id,
};

use super::{
    CandidateDeletion, CandidateEdit, CandidateOrder, CandidateTotals, CandidateUpdate,
    CategoryDeletion, Commit, Store, StoreResult,
};

#[derive(Debug, Default)]
struct State {
    voting_status: Option<VotingStatus>,
    identities: HashMap<Uid, Identity>,
    categories: HashMap<Id, Category>,
    candidates: HashMap<Id, Candidate>,
}

/// An in-process store. Every operation holds a single lock, so each one is
/// atomic with respect to every other.
///
/// Cloning yields another handle on the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    latency: Duration,
    commit_latency: Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every operation by `latency`, to simulate a remote store.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Stall every vote commit for `latency` between setting the flag and
    /// counting the vote, to simulate a commit made of two round trips.
    pub fn with_commit_latency(mut self, latency: Duration) -> Self {
        self.commit_latency = latency;
        self
    }

    async fn lock(&self) -> MutexGuard<'_, State> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.state.lock().await
    }
}

fn sort_candidates(candidates: &mut [Candidate], order: CandidateOrder) {
    match order {
        CandidateOrder::Name => {
            candidates.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)))
        }
        CandidateOrder::Standing => candidates.sort_by(|a, b| {
            b.vote_count
                .cmp(&a.vote_count)
                .then(a.id.cmp(&b.id))
        }),
    }
}

#[rocket::async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn voting_enabled(&self, default: bool) -> StoreResult<bool> {
        let mut state = self.lock().await;
        let status = state.voting_status.get_or_insert_with(|| VotingStatus {
            id: VOTING_STATUS_ID.to_string(),
            is_voting_enabled: default,
        });
        Ok(status.is_voting_enabled)
    }

    async fn set_voting_enabled(&self, enabled: bool) -> StoreResult<()> {
        let mut state = self.lock().await;
        state.voting_status = Some(VotingStatus {
            id: VOTING_STATUS_ID.to_string(),
            is_voting_enabled: enabled,
        });
        Ok(())
    }

    async fn provision_identity(&self, identity: Identity) -> StoreResult<Identity> {
        let mut state = self.lock().await;
        Ok(state
            .identities
            .entry(identity.id.clone())
            .or_insert(identity)
            .clone())
    }

    async fn identity(&self, id: &Uid) -> StoreResult<Option<Identity>> {
        Ok(self.lock().await.identities.get(id).cloned())
    }

    async fn recorded_votes(&self) -> StoreResult<u64> {
        let state = self.lock().await;
        Ok(state
            .identities
            .values()
            .map(|identity| identity.voted().count() as u64)
            .sum())
    }

    async fn category(&self, id: Id) -> StoreResult<Option<Category>> {
        Ok(self.lock().await.categories.get(&id).cloned())
    }

    async fn categories(&self) -> StoreResult<Vec<Category>> {
        let state = self.lock().await;
        let mut categories: Vec<_> = state.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(categories)
    }

    async fn insert_category(&self, category: NewCategory) -> StoreResult<Category> {
        let mut state = self.lock().await;
        let category = Category {
            id: Id::new(),
            category,
        };
        state.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn update_category(
        &self,
        id: Id,
        name: String,
        description: Option<String>,
    ) -> StoreResult<Option<Category>> {
        let mut state = self.lock().await;
        Ok(state.categories.get_mut(&id).map(|category| {
            category.name = name;
            category.description = description;
            category.clone()
        }))
    }

    async fn delete_category(&self, id: Id) -> StoreResult<CategoryDeletion> {
        let mut state = self.lock().await;
        let outcome = match state.categories.get(&id) {
            None => CategoryDeletion::NotFound,
            Some(category) if category.candidate_count > 0 => CategoryDeletion::HasCandidates,
            Some(_) => {
                state.categories.remove(&id);
                CategoryDeletion::Deleted
            }
        };
        Ok(outcome)
    }

    async fn candidate(&self, id: Id) -> StoreResult<Option<Candidate>> {
        Ok(self.lock().await.candidates.get(&id).cloned())
    }

    async fn candidates(
        &self,
        category_id: Option<Id>,
        order: CandidateOrder,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Candidate>> {
        let state = self.lock().await;
        let mut candidates: Vec<_> = state
            .candidates
            .values()
            .filter(|c| category_id.map_or(true, |id| c.category_id == id))
            .cloned()
            .collect();
        sort_candidates(&mut candidates, order);
        if let Some(limit) = limit {
            candidates.truncate(limit);
        }
        Ok(candidates)
    }

    async fn insert_candidate(&self, candidate: NewCandidate) -> StoreResult<Option<Candidate>> {
        let mut state = self.lock().await;
        let category = match state.categories.get_mut(&candidate.category_id) {
            Some(category) => category,
            None => return Ok(None),
        };
        category.candidate_count += 1;
        let candidate = Candidate {
            id: Id::new(),
            candidate,
        };
        state.candidates.insert(candidate.id, candidate.clone());
        Ok(Some(candidate))
    }

    async fn update_candidate(&self, id: Id, edit: CandidateEdit) -> StoreResult<CandidateUpdate> {
        let mut state = self.lock().await;
        let (old_category, vote_count) = match state.candidates.get(&id) {
            Some(candidate) => (candidate.category_id, candidate.vote_count),
            None => return Ok(CandidateUpdate::NotFound),
        };

        if old_category != edit.category_id {
            if vote_count > 0 {
                return Ok(CandidateUpdate::HasVotes);
            }
            match state.categories.get_mut(&edit.category_id) {
                Some(category) => category.candidate_count += 1,
                None => return Ok(CandidateUpdate::CategoryMissing),
            }
            if let Some(category) = state.categories.get_mut(&old_category) {
                category.candidate_count = category.candidate_count.saturating_sub(1);
            }
        }

        // Presence checked above, under the same lock.
        let candidate = state
            .candidates
            .get_mut(&id)
            .map(|candidate| {
                candidate.category_id = edit.category_id;
                candidate.name = edit.name;
                candidate.department = edit.department;
                candidate.faculty = edit.faculty;
                candidate.image_url = edit.image_url;
                candidate.clone()
            });
        Ok(candidate.map_or(CandidateUpdate::NotFound, CandidateUpdate::Updated))
    }

    async fn delete_candidate(&self, id: Id) -> StoreResult<CandidateDeletion> {
        let mut state = self.lock().await;
        let category_id = match state.candidates.get(&id) {
            None => return Ok(CandidateDeletion::NotFound),
            Some(candidate) if candidate.vote_count > 0 => {
                return Ok(CandidateDeletion::HasVotes)
            }
            Some(candidate) => candidate.category_id,
        };
        state.candidates.remove(&id);
        if let Some(category) = state.categories.get_mut(&category_id) {
            category.candidate_count = category.candidate_count.saturating_sub(1);
        }
        Ok(CandidateDeletion::Deleted)
    }

    async fn candidate_totals(&self) -> StoreResult<CandidateTotals> {
        let state = self.lock().await;
        Ok(CandidateTotals {
            candidates: state.candidates.len() as u64,
            votes: state.candidates.values().map(|c| c.vote_count).sum(),
        })
    }

    async fn commit_vote(
        &self,
        identity_id: &Uid,
        category_id: Id,
        candidate_id: Id,
    ) -> StoreResult<Commit> {
        let mut state = self.lock().await;
        let State {
            identities,
            candidates,
            ..
        } = &mut *state;

        let identity = match identities.get_mut(identity_id) {
            Some(identity) => identity,
            None => return Ok(Commit::IdentityMissing),
        };
        if identity.has_voted(category_id) {
            return Ok(Commit::AlreadyVoted);
        }
        let candidate = match candidates.get_mut(&candidate_id) {
            Some(candidate) if candidate.category_id == category_id => candidate,
            _ => return Ok(Commit::CandidateMismatch),
        };

        identity.voted_categories.insert(category_id, true);
        if !self.commit_latency.is_zero() {
            tokio::time::sleep(self.commit_latency).await;
        }
        candidate.vote_count += 1;
        Ok(Commit::Committed)
    }
}
