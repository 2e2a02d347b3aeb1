//! The vote ledger: the one place votes are validated and committed, and the
//! only writer of voted-category flags and candidate tallies.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use rocket::tokio::{task, time};

use crate::error::{Error, Result};
use crate::model::{
    api::{
        auth::Principal,
        candidate::CandidateSpec,
        category::CategorySpec,
        id::ApiId,
        stats::{CategoryStanding, SummaryStats, TallyAudit},
        vote::{Rejection, VoteOutcome, VoteReceipt},
    },
    common::role::Operation,
    db::{
        candidate::{Candidate, NewCandidate},
        category::{Category, NewCategory},
        identity::{Identity, Uid},
        settings::VotingStatus,
    },
    mongodb::Id,
};
use crate::store::{
    CandidateDeletion, CandidateEdit, CandidateOrder, CandidateUpdate, CategoryDeletion, Commit,
    Store, StoreError, StoreResult,
};

/// Shared by every request as managed state. Cloning yields another handle on
/// the same store.
#[derive(Clone)]
pub struct VoteLedger {
    store: Arc<dyn Store>,
    timeout: Duration,
    top_candidates: usize,
}

impl VoteLedger {
    /// A ledger over `store` that gives up on any store call after `timeout`
    /// and reports `top_candidates` per category in standings by default.
    pub fn new(store: Arc<dyn Store>, timeout: Duration, top_candidates: usize) -> Self {
        Self {
            store,
            timeout,
            top_candidates,
        }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Run a store read, failing if it takes longer than the configured timeout.
    async fn timed<T>(&self, call: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        match time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    /// Run a store write on its own task. A timeout only stops the wait: the
    /// write still runs to completion, so multi-step writes are never cut
    /// off halfway.
    async fn detached<T, F, Fut>(&self, write: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn Store>) -> Fut,
        Fut: Future<Output = StoreResult<T>> + Send + 'static,
    {
        let task = task::spawn(write(self.store.clone()));
        match time::timeout(self.timeout, task).await {
            Ok(joined) => joined?,
            Err(_) => {
                warn!("Store write still running after {:?}", self.timeout);
                Err(StoreError::Timeout(self.timeout))
            }
        }
    }

    // Voting switch

    /// Is voting currently enabled? The first read of a missing flag enables it.
    pub async fn voting_status(&self) -> Result<bool> {
        Ok(self
            .timed(self.store.voting_enabled(VotingStatus::DEFAULT_ENABLED))
            .await?)
    }

    pub async fn set_voting_status(&self, enabled: bool) -> Result<()> {
        self.detached(move |store| async move { store.set_voting_enabled(enabled).await })
            .await?;
        info!("Voting {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    // Identities

    /// Find or create the identity for an authenticated principal.
    pub async fn provision_identity(&self, principal: &Principal) -> Result<Identity> {
        let identity = Identity::new(principal);
        let identity = self
            .detached(move |store| async move { store.provision_identity(identity).await })
            .await?;
        debug!("Resolved identity {} ({})", identity.id, identity.role);
        Ok(identity)
    }

    pub async fn identity(&self, id: &Uid) -> Result<Identity> {
        self.timed(self.store.identity(id))
            .await?
            .ok_or_else(|| Error::not_found(format!("Identity {id}")))
    }

    // Votes

    /// Cast a vote, or explain why it was not accepted.
    ///
    /// Checks run in order and the first failure wins: voting enabled,
    /// identity eligible, candidate in the category, no earlier vote in the
    /// category. A rejection leaves everything unchanged. Store failures are
    /// errors, not rejections.
    pub async fn cast_vote(
        &self,
        identity_id: &Uid,
        category_id: Id,
        candidate_id: Id,
    ) -> Result<VoteOutcome> {
        let reject = |rejection: Rejection| -> Result<VoteOutcome> {
            debug!("Vote by {identity_id} for {candidate_id} in {category_id} rejected: {rejection}");
            Ok(VoteOutcome::Rejected(rejection))
        };

        if !self.voting_status().await? {
            return reject(Rejection::VotingDisabled);
        }

        let identity = match self.timed(self.store.identity(identity_id)).await? {
            Some(identity) if identity.role.permits(Operation::CastVote) => identity,
            _ => return reject(Rejection::Unauthenticated),
        };

        match self.timed(self.store.candidate(candidate_id)).await? {
            Some(candidate) if candidate.category_id == category_id => {}
            _ => return reject(Rejection::InvalidCandidate),
        }

        if identity.has_voted(category_id) {
            return reject(Rejection::AlreadyVoted);
        }

        // The checks above can be overtaken; the commit re-checks atomically.
        let uid = identity_id.clone();
        let commit = self
            .detached(move |store| async move {
                store.commit_vote(&uid, category_id, candidate_id).await
            })
            .await?;
        match commit {
            Commit::Committed => {
                info!("Vote by {identity_id} for {candidate_id} in {category_id} accepted");
                Ok(VoteOutcome::Accepted(VoteReceipt {
                    category_id: category_id.into(),
                    candidate_id: candidate_id.into(),
                    cast_at: Utc::now(),
                }))
            }
            Commit::AlreadyVoted => reject(Rejection::AlreadyVoted),
            Commit::CandidateMismatch => reject(Rejection::InvalidCandidate),
            Commit::IdentityMissing => reject(Rejection::Unauthenticated),
        }
    }

    // Reads

    /// All categories, by name.
    pub async fn categories(&self) -> Result<Vec<Category>> {
        Ok(self.timed(self.store.categories()).await?)
    }

    pub async fn category(&self, id: Id) -> Result<Category> {
        self.timed(self.store.category(id))
            .await?
            .ok_or_else(|| Error::not_found(format!("Category {id}")))
    }

    /// The candidates standing in a category, by name.
    pub async fn candidates_in(&self, category_id: Id) -> Result<Vec<Candidate>> {
        self.category(category_id).await?;
        Ok(self
            .timed(
                self.store
                    .candidates(Some(category_id), CandidateOrder::Name, None),
            )
            .await?)
    }

    /// Every candidate whose name, department or faculty contains `query`,
    /// ignoring case. A missing or blank query matches everything.
    pub async fn search_candidates(&self, query: Option<&str>) -> Result<Vec<Candidate>> {
        let candidates = self
            .timed(self.store.candidates(None, CandidateOrder::Name, None))
            .await?;
        Ok(match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(query) => candidates
                .into_iter()
                .filter(|candidate| candidate.matches(query))
                .collect(),
            None => candidates,
        })
    }

    // Aggregation

    /// The leading `n` candidates of each category, most votes first, ties
    /// broken by ascending candidate ID.
    pub async fn top_candidates(
        &self,
        n: Option<usize>,
    ) -> Result<BTreeMap<ApiId, CategoryStanding>> {
        let n = n.unwrap_or(self.top_candidates);
        if n == 0 {
            return Err(Error::Validation("n must be at least 1".to_string()));
        }

        let mut standings = BTreeMap::new();
        for category in self.categories().await? {
            let candidates = self
                .timed(
                    self.store
                        .candidates(Some(category.id), CandidateOrder::Standing, Some(n)),
                )
                .await?;
            standings.insert(
                category.id.into(),
                CategoryStanding {
                    category: category.into(),
                    candidates: candidates.into_iter().map(Into::into).collect(),
                },
            );
        }
        Ok(standings)
    }

    pub async fn summary_stats(&self) -> Result<SummaryStats> {
        let category_count = self.categories().await?.len() as u64;
        let totals = self.timed(self.store.candidate_totals()).await?;
        Ok(SummaryStats {
            candidate_count: totals.candidates,
            total_votes: totals.votes,
            category_count,
        })
    }

    /// Compare the sum of tallies with the number of recorded votes.
    pub async fn audit_tally(&self) -> Result<TallyAudit> {
        let totals = self.timed(self.store.candidate_totals()).await?;
        let recorded = self.timed(self.store.recorded_votes()).await?;
        let audit = TallyAudit::new(totals.votes, recorded);
        if !audit.consistent {
            info!(
                "Tally audit: {} counted, {} recorded",
                audit.total_votes, audit.recorded_votes
            );
        }
        Ok(audit)
    }

    // Category administration

    pub async fn create_category(&self, spec: CategorySpec) -> Result<Category> {
        let category = NewCategory::try_from(spec)?;
        let category = self
            .detached(move |store| async move { store.insert_category(category).await })
            .await?;
        info!("Created category {} ({})", category.id, category.name);
        Ok(category)
    }

    pub async fn update_category(&self, id: Id, spec: CategorySpec) -> Result<Category> {
        let spec = spec.normalized()?;
        let category = self
            .detached(move |store| async move {
                store.update_category(id, spec.name, spec.description).await
            })
            .await?
            .ok_or_else(|| Error::not_found(format!("Category {id}")))?;
        info!("Updated category {} ({})", category.id, category.name);
        Ok(category)
    }

    /// Delete a category. Refused while any candidate stands in it.
    pub async fn delete_category(&self, id: Id) -> Result<()> {
        let deletion = self
            .detached(move |store| async move { store.delete_category(id).await })
            .await?;
        match deletion {
            CategoryDeletion::Deleted => {
                info!("Deleted category {id}");
                Ok(())
            }
            CategoryDeletion::NotFound => Err(Error::not_found(format!("Category {id}"))),
            CategoryDeletion::HasCandidates => Err(Error::Validation(format!(
                "category {id} still has candidates"
            ))),
        }
    }

    // Candidate administration

    pub async fn create_candidate(&self, spec: CandidateSpec) -> Result<Candidate> {
        let candidate = NewCandidate::try_from(spec)?;
        let category_id = candidate.category_id;
        let candidate = self
            .detached(move |store| async move { store.insert_candidate(candidate).await })
            .await?
            .ok_or_else(|| Error::Validation(format!("category {category_id} does not exist")))?;
        info!(
            "Created candidate {} ({}) in {category_id}",
            candidate.id, candidate.name
        );
        Ok(candidate)
    }

    /// Edit a candidate's details, possibly moving it to another category.
    /// The tally is never touched, and a candidate with votes cannot move.
    pub async fn update_candidate(&self, id: Id, spec: CandidateSpec) -> Result<Candidate> {
        let spec = spec.normalized()?;
        let edit = CandidateEdit {
            category_id: spec.category_id.into(),
            name: spec.name,
            department: spec.department,
            faculty: spec.faculty,
            image_url: spec.image_url,
        };
        let category_id = edit.category_id;
        let update = self
            .detached(move |store| async move { store.update_candidate(id, edit).await })
            .await?;
        match update {
            CandidateUpdate::Updated(candidate) => {
                info!("Updated candidate {id} ({})", candidate.name);
                Ok(candidate)
            }
            CandidateUpdate::NotFound => Err(Error::not_found(format!("Candidate {id}"))),
            CandidateUpdate::CategoryMissing => Err(Error::Validation(format!(
                "category {category_id} does not exist"
            ))),
            CandidateUpdate::HasVotes => Err(Error::Validation(format!(
                "candidate {id} has votes and cannot change category"
            ))),
        }
    }

    /// Delete a candidate. Refused once it has votes.
    pub async fn delete_candidate(&self, id: Id) -> Result<()> {
        let deletion = self
            .detached(move |store| async move { store.delete_candidate(id).await })
            .await?;
        match deletion {
            CandidateDeletion::Deleted => {
                info!("Deleted candidate {id}");
                Ok(())
            }
            CandidateDeletion::NotFound => Err(Error::not_found(format!("Candidate {id}"))),
            CandidateDeletion::HasVotes => Err(Error::Validation(format!(
                "candidate {id} has votes and cannot be deleted"
            ))),
        }
    }
}
