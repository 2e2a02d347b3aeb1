//! Persistence behind the vote ledger.
//!
//! [`Store`] is the document store interface the ledger consumes: point reads
//! and writes, single-document conditional writes, atomic increments, ordered
//! listing, and the vote commit. [`MongoStore`] is the production backend and
//! [`MemoryStore`] keeps everything in process.

use std::time::Duration;

use thiserror::Error;

use crate::model::{
    db::{
        candidate::{Candidate, NewCandidate},
        category::{Category, NewCategory},
        identity::{Identity, Uid},
    },
    mongodb::Id,
};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// The store could not complete an operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] mongodb::error::Error),
    #[error(transparent)]
    Bson(#[from] mongodb::bson::ser::Error),
    #[error("store did not respond within {0:?}")]
    Timeout(Duration),
    #[error("transaction still conflicting after {0} attempts")]
    Contention(u32),
    #[error("store task did not finish: {0}")]
    Task(#[from] rocket::tokio::task::JoinError),
}

/// How candidate listings are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOrder {
    /// Alphabetically by name.
    Name,
    /// Most votes first, ties broken by ascending ID.
    Standing,
}

/// The editable fields of a candidate. Vote counts are not among them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEdit {
    pub category_id: Id,
    pub name: String,
    pub department: Option<String>,
    pub faculty: Option<String>,
    pub image_url: Option<String>,
}

/// Outcome of committing a validated vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// Flag set and tally incremented.
    Committed,
    /// The identity's flag for this category was already set; nothing changed.
    AlreadyVoted,
    /// The candidate vanished or changed category; nothing changed.
    CandidateMismatch,
    /// The identity vanished; nothing changed.
    IdentityMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryDeletion {
    Deleted,
    NotFound,
    /// Candidates still reference the category.
    HasCandidates,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateUpdate {
    Updated(Candidate),
    NotFound,
    /// The target category does not exist.
    CategoryMissing,
    /// The candidate has votes and so cannot change category.
    HasVotes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateDeletion {
    Deleted,
    NotFound,
    /// The candidate has votes and so cannot be removed.
    HasVotes,
}

/// Aggregate candidate numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CandidateTotals {
    pub candidates: u64,
    pub votes: u64,
}

#[rocket::async_trait]
pub trait Store: Send + Sync {
    /// Short name of the backend, for logging.
    fn backend(&self) -> &'static str;

    // Voting switch

    /// Read the voting-enabled flag, atomically initialising it to `default` if absent.
    async fn voting_enabled(&self, default: bool) -> StoreResult<bool>;

    /// Unconditionally overwrite the voting-enabled flag.
    async fn set_voting_enabled(&self, enabled: bool) -> StoreResult<()>;

    // Identities

    /// Insert `identity` unless one with the same ID exists, returning whichever is stored.
    async fn provision_identity(&self, identity: Identity) -> StoreResult<Identity>;

    async fn identity(&self, id: &Uid) -> StoreResult<Option<Identity>>;

    /// The number of set voted-category flags across all identities.
    async fn recorded_votes(&self) -> StoreResult<u64>;

    // Categories

    async fn category(&self, id: Id) -> StoreResult<Option<Category>>;

    /// All categories, ordered by name.
    async fn categories(&self) -> StoreResult<Vec<Category>>;

    async fn insert_category(&self, category: NewCategory) -> StoreResult<Category>;

    /// Replace the name and description, returning the updated category if it exists.
    async fn update_category(
        &self,
        id: Id,
        name: String,
        description: Option<String>,
    ) -> StoreResult<Option<Category>>;

    /// Delete the category unless candidates still reference it.
    async fn delete_category(&self, id: Id) -> StoreResult<CategoryDeletion>;

    // Candidates

    async fn candidate(&self, id: Id) -> StoreResult<Option<Candidate>>;

    /// Candidates, optionally restricted to one category, in the given order.
    async fn candidates(
        &self,
        category_id: Option<Id>,
        order: CandidateOrder,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Candidate>>;

    /// Insert the candidate and bump its category's candidate count together.
    /// Returns `None` if the category does not exist.
    async fn insert_candidate(&self, candidate: NewCandidate) -> StoreResult<Option<Candidate>>;

    async fn update_candidate(&self, id: Id, edit: CandidateEdit) -> StoreResult<CandidateUpdate>;

    async fn delete_candidate(&self, id: Id) -> StoreResult<CandidateDeletion>;

    async fn candidate_totals(&self) -> StoreResult<CandidateTotals>;

    // Votes

    /// Atomically set the identity's flag for `category_id` and increment the
    /// candidate's tally, or do neither.
    ///
    /// The flag is only set if it was not already set, and the tally is only
    /// incremented if the candidate still stands in `category_id`.
    async fn commit_vote(
        &self,
        identity_id: &Uid,
        category_id: Id,
        candidate_id: Id,
    ) -> StoreResult<Commit>;
}
