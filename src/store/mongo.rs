use std::future::Future;

use log::{debug, error, warn};
use mongodb::{
    bson::{doc, Bson, Document},
    error::{Error as DbError, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument, UpdateOptions},
    Client, ClientSession, Database,
};
use rocket::futures::TryStreamExt;

use crate::model::{
    db::{
        candidate::{Candidate, NewCandidate},
        category::{Category, NewCategory},
        identity::{Identity, Uid},
        settings::{VotingStatus, VOTING_STATUS_ID},
    },
    mongodb::{ensure_indexes_exist, is_duplicate_key_error, is_transient_transaction_error, Coll, Id},
};

use super::{
    CandidateDeletion, CandidateEdit, CandidateOrder, CandidateTotals, CandidateUpdate,
    CategoryDeletion, Commit, Store, StoreError, StoreResult,
};

/// Attempts at a vote transaction before giving up on a contended commit.
const MAX_TRANSACTION_ATTEMPTS: u32 = 8;

/// Attempts at a commit whose result the server could not confirm.
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Attempts at a candidate edit that keeps racing a concurrent move.
const MAX_EDIT_ATTEMPTS: u32 = 4;

/// A store backed by a MongoDB database.
///
/// With `transactions` on, a vote's flag and tally are written in one
/// multi-document transaction, which needs a replica set. With it off, the
/// identity's flag is set first as a barrier and cleared again if the tally
/// cannot be incremented.
#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
    transactions: bool,
}

impl MongoStore {
    pub fn new(client: Client, db_name: &str, transactions: bool) -> Self {
        let db = client.database(db_name);
        Self {
            client,
            db,
            transactions,
        }
    }

    /// Connect to the given deployment and make sure the indexes exist.
    pub async fn connect(uri: &str, db_name: &str, transactions: bool) -> StoreResult<Self> {
        let client = Client::with_uri_str(uri).await?;
        let store = Self::new(client, db_name, transactions);
        ensure_indexes_exist(&store.db).await?;
        Ok(store)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn settings(&self) -> Coll<VotingStatus> {
        Coll::from_db(&self.db)
    }

    fn identities(&self) -> Coll<Identity> {
        Coll::from_db(&self.db)
    }

    fn categories_coll(&self) -> Coll<Category> {
        Coll::from_db(&self.db)
    }

    fn candidates_coll(&self) -> Coll<Candidate> {
        Coll::from_db(&self.db)
    }

    /// Undo a `candidate_count` reservation on a category.
    async fn release_slot(&self, category_id: Id) -> Result<(), DbError> {
        let (filter, update) = slot_update(category_id, -1);
        self.categories_coll().update_one(filter, update, None).await?;
        Ok(())
    }

    /// Work out why the flag could not be set: either it already was, or the
    /// identity is gone.
    async fn explain_flag_miss(
        &self,
        identity_id: &Uid,
        session: Option<&mut ClientSession>,
    ) -> Result<Commit, DbError> {
        let filter = doc! { "_id": identity_id.as_str() };
        let identities = self.identities();
        let identity = match session {
            Some(session) => {
                identities
                    .find_one_with_session(filter, None, session)
                    .await?
            }
            None => identities.find_one(filter, None).await?,
        };
        Ok(match identity {
            Some(_) => Commit::AlreadyVoted,
            None => Commit::IdentityMissing,
        })
    }

    /// Set the flag and bump the tally inside the session's open transaction.
    async fn flag_and_count(
        &self,
        session: &mut ClientSession,
        identity_id: &Uid,
        category_id: Id,
        candidate_id: Id,
    ) -> Result<Commit, DbError> {
        let (filter, update) = flag_update(identity_id, category_id);
        let flagged = self
            .identities()
            .update_one_with_session(filter, update, None, session)
            .await?;
        if flagged.matched_count == 0 {
            return self.explain_flag_miss(identity_id, Some(session)).await;
        }

        let (filter, update) = tally_update(category_id, candidate_id);
        let counted = self
            .candidates_coll()
            .update_one_with_session(filter, update, None, session)
            .await?;
        if counted.matched_count == 0 {
            return Ok(Commit::CandidateMismatch);
        }
        Ok(Commit::Committed)
    }

    async fn commit_in_transaction(
        &self,
        identity_id: &Uid,
        category_id: Id,
        candidate_id: Id,
    ) -> StoreResult<Commit> {
        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            let mut session = self.client.start_session(None).await?;
            session.start_transaction(None).await?;

            // Dropping the session aborts the transaction.
            let outcome = match self
                .flag_and_count(&mut session, identity_id, category_id, candidate_id)
                .await
            {
                Ok(outcome) => outcome,
                Err(err) if is_transient_transaction_error(&err) => {
                    debug!("Vote by {identity_id} conflicted (attempt {attempt}): {err}");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            if outcome != Commit::Committed {
                session.abort_transaction().await?;
                return Ok(outcome);
            }

            match commit_with_retry(&mut session).await {
                Ok(()) => return Ok(Commit::Committed),
                Err(err) if is_transient_transaction_error(&err) => {
                    debug!("Vote by {identity_id} failed to commit (attempt {attempt}): {err}");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(StoreError::Contention(MAX_TRANSACTION_ATTEMPTS))
    }

    async fn insert_candidate_in_transaction(
        &self,
        candidate: Candidate,
    ) -> Result<Option<Candidate>, DbError> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        // Returning early drops the session, which aborts the transaction.
        let (filter, update) = slot_update(candidate.category_id, 1);
        let reserved = self
            .categories_coll()
            .update_one_with_session(filter, update, None, &mut session)
            .await?;
        if reserved.matched_count == 0 {
            return Ok(None);
        }
        self.candidates_coll()
            .insert_one_with_session(&candidate, None, &mut session)
            .await?;

        commit_with_retry(&mut session).await?;
        Ok(Some(candidate))
    }

    async fn update_candidate_in_transaction(
        &self,
        id: Id,
        edit: CandidateEdit,
    ) -> Result<CandidateUpdate, DbError> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        let candidates = self.candidates_coll();

        let current = match candidates
            .find_one_with_session(id.as_doc(), None, &mut session)
            .await?
        {
            Some(current) => current,
            None => return Ok(CandidateUpdate::NotFound),
        };
        let moving = current.category_id != edit.category_id;
        if moving && current.vote_count > 0 {
            return Ok(CandidateUpdate::HasVotes);
        }

        let categories = self.categories_coll();
        if moving {
            let (filter, update) = slot_update(edit.category_id, 1);
            let reserved = categories
                .update_one_with_session(filter, update, None, &mut session)
                .await?;
            if reserved.matched_count == 0 {
                return Ok(CandidateUpdate::CategoryMissing);
            }
        }

        // A concurrent vote on the same candidate surfaces as a write conflict.
        let (filter, update) = edit_update(id, &current, moving, &edit);
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let updated = match candidates
            .find_one_and_update_with_session(filter, update, options, &mut session)
            .await?
        {
            Some(updated) => updated,
            None => return Ok(CandidateUpdate::NotFound),
        };
        if moving {
            let (filter, update) = slot_update(current.category_id, -1);
            categories
                .update_one_with_session(filter, update, None, &mut session)
                .await?;
        }

        commit_with_retry(&mut session).await?;
        Ok(CandidateUpdate::Updated(updated))
    }

    async fn delete_candidate_in_transaction(&self, id: Id) -> Result<CandidateDeletion, DbError> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        let candidates = self.candidates_coll();

        let filter = doc! {
            "_id": id,
            "vote_count": 0,
        };
        let deleted = candidates
            .find_one_and_delete_with_session(filter, None, &mut session)
            .await?;
        let deleted = match deleted {
            Some(deleted) => deleted,
            None => {
                let remaining = candidates
                    .find_one_with_session(id.as_doc(), None, &mut session)
                    .await?;
                return Ok(match remaining {
                    Some(_) => CandidateDeletion::HasVotes,
                    None => CandidateDeletion::NotFound,
                });
            }
        };
        let (filter, update) = slot_update(deleted.category_id, -1);
        self.categories_coll()
            .update_one_with_session(filter, update, None, &mut session)
            .await?;

        commit_with_retry(&mut session).await?;
        Ok(CandidateDeletion::Deleted)
    }

    // Without transactions, a category's slot is reserved before its candidate
    // document changes and released after, so `candidate_count` may overstate
    // but never understate the candidates referencing it.

    async fn insert_candidate_standalone(
        &self,
        candidate: Candidate,
    ) -> StoreResult<Option<Candidate>> {
        let (filter, update) = slot_update(candidate.category_id, 1);
        let reserved = self
            .categories_coll()
            .update_one(filter, update, None)
            .await?;
        if reserved.matched_count == 0 {
            return Ok(None);
        }

        if let Err(err) = self.candidates_coll().insert_one(&candidate, None).await {
            if let Err(release) = self.release_slot(candidate.category_id).await {
                error!("Slot in {} left reserved: {release}", candidate.category_id);
            }
            return Err(err.into());
        }
        Ok(Some(candidate))
    }

    async fn update_candidate_standalone(
        &self,
        id: Id,
        edit: CandidateEdit,
    ) -> StoreResult<CandidateUpdate> {
        let candidates = self.candidates_coll();
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        for _ in 0..MAX_EDIT_ATTEMPTS {
            let current = match candidates.find_one(id.as_doc(), None).await? {
                Some(current) => current,
                None => return Ok(CandidateUpdate::NotFound),
            };
            let moving = current.category_id != edit.category_id;
            if moving && current.vote_count > 0 {
                return Ok(CandidateUpdate::HasVotes);
            }

            if moving {
                let (filter, update) = slot_update(edit.category_id, 1);
                let reserved = self
                    .categories_coll()
                    .update_one(filter, update, None)
                    .await?;
                if reserved.matched_count == 0 {
                    return Ok(CandidateUpdate::CategoryMissing);
                }
            }

            // Guard on the category read above; a vote commit for a moved
            // candidate no longer matches, and a move of a voted one is refused.
            let (filter, update) = edit_update(id, &current, moving, &edit);
            let updated = candidates
                .find_one_and_update(filter, update, options.clone())
                .await?;

            match updated {
                Some(updated) => {
                    if moving {
                        self.release_slot(current.category_id).await?;
                    }
                    return Ok(CandidateUpdate::Updated(updated));
                }
                None if moving => self.release_slot(edit.category_id).await?,
                None => {}
            }
            debug!("Candidate {id} changed during edit, retrying");
        }
        Err(StoreError::Contention(MAX_EDIT_ATTEMPTS))
    }

    async fn delete_candidate_standalone(&self, id: Id) -> StoreResult<CandidateDeletion> {
        let candidates = self.candidates_coll();
        let filter = doc! {
            "_id": id,
            "vote_count": 0,
        };
        if let Some(deleted) = candidates.find_one_and_delete(filter, None).await? {
            if let Err(err) = self.release_slot(deleted.category_id).await {
                error!("Deleted {id} but slot in {} left reserved: {err}", deleted.category_id);
                return Err(err.into());
            }
            return Ok(CandidateDeletion::Deleted);
        }
        Ok(match candidates.find_one(id.as_doc(), None).await? {
            Some(_) => CandidateDeletion::HasVotes,
            None => CandidateDeletion::NotFound,
        })
    }

    async fn commit_with_barrier(
        &self,
        identity_id: &Uid,
        category_id: Id,
        candidate_id: Id,
    ) -> StoreResult<Commit> {
        // Only one writer can flip the flag, so only one can go on to count.
        let (filter, update) = flag_update(identity_id, category_id);
        let flagged = self.identities().update_one(filter, update, None).await?;
        if flagged.matched_count == 0 {
            return Ok(self.explain_flag_miss(identity_id, None).await?);
        }

        let (filter, update) = tally_update(category_id, candidate_id);
        let counted = match self.candidates_coll().update_one(filter, update, None).await {
            Ok(counted) => counted,
            Err(err) => {
                // The increment may have landed; leaving the flag set can lose
                // this vote but never counts it twice.
                error!("Tally for {candidate_id} by {identity_id} unconfirmed: {err}");
                return Err(err.into());
            }
        };
        if counted.matched_count == 1 {
            return Ok(Commit::Committed);
        }

        let field = Identity::voted_field(category_id);
        let filter = doc! {
            "_id": identity_id.as_str(),
            &field: true,
        };
        let update = doc! { "$unset": { &field: "" } };
        self.identities().update_one(filter, update, None).await?;
        warn!("Cleared flag for {identity_id} in {category_id}: candidate {candidate_id} not in category");
        Ok(Commit::CandidateMismatch)
    }
}

/// Filter and update that set the identity's flag only if it is not yet set.
fn flag_update(identity_id: &Uid, category_id: Id) -> (Document, Document) {
    let field = Identity::voted_field(category_id);
    let filter = doc! {
        "_id": identity_id.as_str(),
        &field: { "$ne": true },
    };
    let update = doc! { "$set": { &field: true } };
    (filter, update)
}

/// Filter and update that increment the tally only if the candidate is in the category.
fn tally_update(category_id: Id, candidate_id: Id) -> (Document, Document) {
    let filter = doc! {
        "_id": candidate_id,
        "category_id": category_id,
    };
    let update = doc! { "$inc": { "vote_count": 1 } };
    (filter, update)
}

/// Filter and update that move a category's `candidate_count` by `delta`,
/// never below zero.
fn slot_update(category_id: Id, delta: i32) -> (Document, Document) {
    let mut filter = doc! { "_id": category_id };
    if delta < 0 {
        filter.insert("candidate_count", doc! { "$gte": -delta });
    }
    let update = doc! { "$inc": { "candidate_count": delta } };
    (filter, update)
}

/// Filter and update that apply `edit` to a candidate last seen as `current`.
/// A move only applies while the candidate still has no votes.
fn edit_update(
    id: Id,
    current: &Candidate,
    moving: bool,
    edit: &CandidateEdit,
) -> (Document, Document) {
    let mut filter = doc! {
        "_id": id,
        "category_id": current.category_id,
    };
    if moving {
        filter.insert("vote_count", 0);
    }
    let update = doc! {
        "$set": {
            "category_id": edit.category_id,
            "name": edit.name.clone(),
            "department": edit.department.clone(),
            "faculty": edit.faculty.clone(),
            "image_url": edit.image_url.clone(),
        }
    };
    (filter, update)
}

/// Run a transaction until it commits, or fails for a reason other than a
/// conflict with another transaction.
async fn retry_transient<T, F, Fut>(mut attempt_once: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
        match attempt_once().await {
            Err(err) if is_transient_transaction_error(&err) => {
                debug!("Transaction conflicted (attempt {attempt}): {err}");
            }
            result => return Ok(result?),
        }
    }
    Err(StoreError::Contention(MAX_TRANSACTION_ATTEMPTS))
}

async fn commit_with_retry(session: &mut ClientSession) -> Result<(), DbError> {
    let mut attempt = 1;
    loop {
        match session.commit_transaction().await {
            Err(err)
                if err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                    && attempt < MAX_COMMIT_ATTEMPTS =>
            {
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Read an aggregation count, whatever numeric type the server chose.
fn count_field(doc: &Document, key: &str) -> u64 {
    match doc.get(key) {
        Some(Bson::Int32(n)) => u64::try_from(*n).unwrap_or(0),
        Some(Bson::Int64(n)) => u64::try_from(*n).unwrap_or(0),
        Some(Bson::Double(n)) if *n > 0.0 => {
            if n.fract() != 0.0 {
                warn!("Aggregate {key} is not a whole number: {n}");
            }
            n.round() as u64
        }
        _ => 0,
    }
}

#[rocket::async_trait]
impl Store for MongoStore {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    async fn voting_enabled(&self, default: bool) -> StoreResult<bool> {
        let settings = self.settings();
        let filter = doc! { "_id": VOTING_STATUS_ID };
        if let Some(status) = settings.find_one(filter.clone(), None).await? {
            return Ok(status.is_voting_enabled);
        }

        // First reader initialises the flag; concurrent readers see its value.
        let update = doc! { "$setOnInsert": { "is_voting_enabled": default } };
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let status = match settings
            .find_one_and_update(filter.clone(), update, options)
            .await
        {
            Ok(status) => status,
            Err(err) if is_duplicate_key_error(&err) => settings.find_one(filter, None).await?,
            Err(err) => return Err(err.into()),
        };
        Ok(status.map_or(default, |status| status.is_voting_enabled))
    }

    async fn set_voting_enabled(&self, enabled: bool) -> StoreResult<()> {
        let filter = doc! { "_id": VOTING_STATUS_ID };
        let update = doc! { "$set": { "is_voting_enabled": enabled } };
        let options = UpdateOptions::builder().upsert(true).build();
        self.settings().update_one(filter, update, options).await?;
        Ok(())
    }

    async fn provision_identity(&self, identity: Identity) -> StoreResult<Identity> {
        let identities = self.identities();
        let filter = doc! { "_id": identity.id.as_str() };
        if let Some(existing) = identities.find_one(filter.clone(), None).await? {
            return Ok(existing);
        }

        match identities.insert_one(&identity, None).await {
            Ok(_) => Ok(identity),
            // Lost the race to a concurrent first request; keep theirs.
            Err(err) if is_duplicate_key_error(&err) => Ok(identities
                .find_one(filter, None)
                .await?
                .unwrap_or(identity)),
            Err(err) => Err(err.into()),
        }
    }

    async fn identity(&self, id: &Uid) -> StoreResult<Option<Identity>> {
        let filter = doc! { "_id": id.as_str() };
        Ok(self.identities().find_one(filter, None).await?)
    }

    async fn recorded_votes(&self) -> StoreResult<u64> {
        let pipeline = [
            doc! {
                "$project": {
                    "flags": {
                        "$size": {
                            "$filter": {
                                "input": { "$objectToArray": { "$ifNull": ["$voted_categories", {}] } },
                                "cond": { "$eq": ["$$this.v", true] },
                            }
                        }
                    }
                }
            },
            doc! { "$group": { "_id": Bson::Null, "total": { "$sum": "$flags" } } },
        ];
        let totals: Vec<Document> = self
            .identities()
            .aggregate(pipeline, None)
            .await?
            .try_collect()
            .await?;
        Ok(totals
            .first()
            .map_or(0, |totals| count_field(totals, "total")))
    }

    async fn category(&self, id: Id) -> StoreResult<Option<Category>> {
        Ok(self.categories_coll().find_one(id.as_doc(), None).await?)
    }

    async fn categories(&self) -> StoreResult<Vec<Category>> {
        let mut options = FindOptions::default();
        options.sort = Some(doc! { "name": 1, "_id": 1 });
        Ok(self
            .categories_coll()
            .find(None, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn insert_category(&self, category: NewCategory) -> StoreResult<Category> {
        let category = Category {
            id: Id::new(),
            category,
        };
        self.categories_coll().insert_one(&category, None).await?;
        Ok(category)
    }

    async fn update_category(
        &self,
        id: Id,
        name: String,
        description: Option<String>,
    ) -> StoreResult<Option<Category>> {
        let update = doc! {
            "$set": {
                "name": name,
                "description": description,
            }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        Ok(self
            .categories_coll()
            .find_one_and_update(id.as_doc(), update, options)
            .await?)
    }

    async fn delete_category(&self, id: Id) -> StoreResult<CategoryDeletion> {
        // Candidate inserts bump the count on this same document first, so
        // the condition cannot be overtaken by a concurrent insert.
        let filter = doc! {
            "_id": id,
            "candidate_count": 0,
        };
        let categories = self.categories_coll();
        if categories.delete_one(filter, None).await?.deleted_count == 1 {
            return Ok(CategoryDeletion::Deleted);
        }
        Ok(match categories.find_one(id.as_doc(), None).await? {
            Some(_) => CategoryDeletion::HasCandidates,
            None => CategoryDeletion::NotFound,
        })
    }

    async fn candidate(&self, id: Id) -> StoreResult<Option<Candidate>> {
        Ok(self.candidates_coll().find_one(id.as_doc(), None).await?)
    }

    async fn candidates(
        &self,
        category_id: Option<Id>,
        order: CandidateOrder,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Candidate>> {
        let filter = category_id.map(|id| doc! { "category_id": id });
        let mut options = FindOptions::default();
        options.sort = Some(match order {
            CandidateOrder::Name => doc! { "name": 1, "_id": 1 },
            CandidateOrder::Standing => doc! { "vote_count": -1, "_id": 1 },
        });
        options.limit = limit.map(|limit| i64::try_from(limit).unwrap_or(i64::MAX));
        Ok(self
            .candidates_coll()
            .find(filter, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn insert_candidate(&self, candidate: NewCandidate) -> StoreResult<Option<Candidate>> {
        let candidate = Candidate {
            id: Id::new(),
            candidate,
        };
        if self.transactions {
            retry_transient(move || self.insert_candidate_in_transaction(candidate.clone())).await
        } else {
            self.insert_candidate_standalone(candidate).await
        }
    }

    async fn update_candidate(&self, id: Id, edit: CandidateEdit) -> StoreResult<CandidateUpdate> {
        if self.transactions {
            retry_transient(move || self.update_candidate_in_transaction(id, edit.clone())).await
        } else {
            self.update_candidate_standalone(id, edit).await
        }
    }

    async fn delete_candidate(&self, id: Id) -> StoreResult<CandidateDeletion> {
        if self.transactions {
            retry_transient(move || self.delete_candidate_in_transaction(id)).await
        } else {
            self.delete_candidate_standalone(id).await
        }
    }

    async fn candidate_totals(&self) -> StoreResult<CandidateTotals> {
        let pipeline = [doc! {
            "$group": {
                "_id": Bson::Null,
                "candidates": { "$sum": 1 },
                "votes": { "$sum": "$vote_count" },
            }
        }];
        let totals: Vec<Document> = self
            .candidates_coll()
            .aggregate(pipeline, None)
            .await?
            .try_collect()
            .await?;
        Ok(totals
            .first()
            .map_or_else(CandidateTotals::default, |totals| CandidateTotals {
                candidates: count_field(totals, "candidates"),
                votes: count_field(totals, "votes"),
            }))
    }

    async fn commit_vote(
        &self,
        identity_id: &Uid,
        category_id: Id,
        candidate_id: Id,
    ) -> StoreResult<Commit> {
        if self.transactions {
            self.commit_in_transaction(identity_id, category_id, candidate_id)
                .await
        } else {
            self.commit_with_barrier(identity_id, category_id, candidate_id)
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::sync::Arc;

    use rocket::tokio;

    use super::*;
    use crate::model::api::auth::Principal;

    /// Connect to the deployment named by `AWARDS_TEST_DB_URI`, in a fresh database.
    async fn test_store(transactions: bool) -> MongoStore {
        let uri = env::var("AWARDS_TEST_DB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017/?replicaSet=rs0".to_string());
        let db_name = format!("awards_test_{:08x}", rand::random::<u32>());
        MongoStore::connect(&uri, &db_name, transactions)
            .await
            .unwrap()
    }

    async fn seed(store: &MongoStore) -> (Identity, Category, Candidate) {
        let identity = store
            .provision_identity(Identity::new(&Principal::example_voter()))
            .await
            .unwrap();
        let category = store
            .insert_category(NewCategory::example())
            .await
            .unwrap();
        let candidate = store
            .insert_candidate(NewCandidate::example(category.id))
            .await
            .unwrap()
            .unwrap();
        (identity, category, candidate)
    }

    /// Cast 16 votes at once for one identity in one category, split across
    /// two candidates if `rivals` is set.
    async fn concurrent_casts_count_once(transactions: bool, rivals: bool) {
        let store = Arc::new(test_store(transactions).await);
        let (identity, category, candidate) = seed(&store).await;
        let rival = store
            .insert_candidate(NewCandidate::example(category.id))
            .await
            .unwrap()
            .unwrap();
        let category_id = category.id;

        let handles = (0..16)
            .map(|n| {
                let store = store.clone();
                let uid = identity.id.clone();
                let candidate_id = if rivals && n % 2 == 1 {
                    rival.id
                } else {
                    candidate.id
                };
                tokio::spawn(async move {
                    store.commit_vote(&uid, category_id, candidate_id).await
                })
            })
            .collect::<Vec<_>>();
        let mut committed = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                Commit::Committed => committed += 1,
                outcome => assert_eq!(outcome, Commit::AlreadyVoted),
            }
        }
        assert_eq!(committed, 1);

        let totals = store.candidate_totals().await.unwrap();
        assert_eq!(totals.votes, 1);
        assert_eq!(store.recorded_votes().await.unwrap(), 1);
        if !rivals {
            let rival = store.candidate(rival.id).await.unwrap().unwrap();
            assert_eq!(rival.vote_count, 0);
        }

        store.database().drop(None).await.unwrap();
    }

    #[rocket::async_test]
    #[ignore = "needs a MongoDB replica set at AWARDS_TEST_DB_URI"]
    async fn transactional_casts_count_once() {
        concurrent_casts_count_once(true, false).await;
    }

    #[rocket::async_test]
    #[ignore = "needs a MongoDB replica set at AWARDS_TEST_DB_URI"]
    async fn transactional_rival_casts_count_once() {
        concurrent_casts_count_once(true, true).await;
    }

    #[rocket::async_test]
    #[ignore = "needs a MongoDB deployment at AWARDS_TEST_DB_URI"]
    async fn barrier_casts_count_once() {
        concurrent_casts_count_once(false, false).await;
    }

    #[rocket::async_test]
    #[ignore = "needs a MongoDB deployment at AWARDS_TEST_DB_URI"]
    async fn barrier_rival_casts_count_once() {
        concurrent_casts_count_once(false, true).await;
    }

    #[test]
    fn aggregate_counts_are_whole_numbers() {
        let totals = doc! {
            "int": 3_i32,
            "long": 4_i64,
            "double": 2.6,
            "negative": -1_i64,
        };
        assert_eq!(count_field(&totals, "int"), 3);
        assert_eq!(count_field(&totals, "long"), 4);
        assert_eq!(count_field(&totals, "double"), 3);
        assert_eq!(count_field(&totals, "negative"), 0);
        assert_eq!(count_field(&totals, "missing"), 0);
    }

    async fn category_count(store: &MongoStore, id: Id) -> u32 {
        store.category(id).await.unwrap().unwrap().candidate_count
    }

    #[rocket::async_test]
    #[ignore = "needs a MongoDB replica set at AWARDS_TEST_DB_URI"]
    async fn transactional_candidate_edits_keep_counts() {
        let store = test_store(true).await;
        let (_, dancer, candidate) = seed(&store).await;
        let fashion = store
            .insert_category(NewCategory::example2())
            .await
            .unwrap();

        // Nothing is left behind by an insert into a missing category.
        let orphan = store
            .insert_candidate(NewCandidate::example(Id::new()))
            .await
            .unwrap();
        assert!(orphan.is_none());
        assert_eq!(store.candidate_totals().await.unwrap().candidates, 1);

        let edit = CandidateEdit {
            category_id: fashion.id,
            name: candidate.name.clone(),
            department: None,
            faculty: None,
            image_url: None,
        };
        let moved = store.update_candidate(candidate.id, edit.clone()).await.unwrap();
        assert!(matches!(moved, CandidateUpdate::Updated(ref c) if c.category_id == fashion.id));
        assert_eq!(category_count(&store, dancer.id).await, 0);
        assert_eq!(category_count(&store, fashion.id).await, 1);

        let missing = CandidateEdit {
            category_id: Id::new(),
            ..edit
        };
        assert_eq!(
            store.update_candidate(candidate.id, missing).await.unwrap(),
            CandidateUpdate::CategoryMissing
        );
        assert_eq!(category_count(&store, fashion.id).await, 1);

        assert_eq!(
            store.delete_candidate(candidate.id).await.unwrap(),
            CandidateDeletion::Deleted
        );
        assert_eq!(category_count(&store, fashion.id).await, 0);
        assert_eq!(
            store.delete_category(fashion.id).await.unwrap(),
            CategoryDeletion::Deleted
        );
        assert_eq!(
            store.delete_category(dancer.id).await.unwrap(),
            CategoryDeletion::Deleted
        );

        store.database().drop(None).await.unwrap();
    }

    #[rocket::async_test]
    #[ignore = "needs a MongoDB deployment at AWARDS_TEST_DB_URI"]
    async fn mismatched_candidate_leaves_no_flag() {
        let store = test_store(false).await;
        let (identity, category, _) = seed(&store).await;
        let other = store
            .insert_category(NewCategory::example2())
            .await
            .unwrap();
        let stranger = store
            .insert_candidate(NewCandidate::example(other.id))
            .await
            .unwrap()
            .unwrap();

        let outcome = store
            .commit_vote(&identity.id, category.id, stranger.id)
            .await
            .unwrap();
        assert_eq!(outcome, Commit::CandidateMismatch);
        let identity = store.identity(&identity.id).await.unwrap().unwrap();
        assert!(!identity.has_voted(category.id));

        store.database().drop(None).await.unwrap();
    }

    #[rocket::async_test]
    #[ignore = "needs a MongoDB deployment at AWARDS_TEST_DB_URI"]
    async fn category_with_candidates_is_kept() {
        let store = test_store(false).await;
        let (_, category, candidate) = seed(&store).await;

        assert_eq!(
            store.delete_category(category.id).await.unwrap(),
            CategoryDeletion::HasCandidates
        );
        assert_eq!(
            store.delete_candidate(candidate.id).await.unwrap(),
            CandidateDeletion::Deleted
        );
        assert_eq!(
            store.delete_category(category.id).await.unwrap(),
            CategoryDeletion::Deleted
        );

        store.database().drop(None).await.unwrap();
    }
}
