use std::ops::Deref;

use log::debug;
use mongodb::{bson::doc, error::Error as DbError, Collection, Database, IndexModel};

use crate::model::db::{
    candidate::Candidate,
    category::Category,
    identity::Identity,
    settings::VotingStatus,
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Category collections ("posts")
const CATEGORIES: &str = "categories";
impl MongoCollection for Category {
    const NAME: &'static str = CATEGORIES;
}

// Candidate collections
const CANDIDATES: &str = "candidates";
impl MongoCollection for Candidate {
    const NAME: &'static str = CANDIDATES;
}

// Identity collection ("users")
const IDENTITIES: &str = "identities";
impl MongoCollection for Identity {
    const NAME: &'static str = IDENTITIES;
}

// Settings collection
const SETTINGS: &str = "settings";
impl MongoCollection for VotingStatus {
    const NAME: &'static str = SETTINGS;
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    // Category listing is ordered by name.
    let category_index = IndexModel::builder().keys(doc! {"name": 1}).build();
    Coll::<Category>::from_db(db)
        .create_index(category_index, None)
        .await?;

    // Candidates are listed per category, by name or by standing.
    let by_name = IndexModel::builder()
        .keys(doc! {"category_id": 1, "name": 1})
        .build();
    let by_standing = IndexModel::builder()
        .keys(doc! {"category_id": 1, "vote_count": -1, "_id": 1})
        .build();
    Coll::<Candidate>::from_db(db)
        .create_indexes([by_name, by_standing], None)
        .await?;

    Ok(())
}
