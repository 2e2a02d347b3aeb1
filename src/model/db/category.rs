use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core category ("post") data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCore {
    pub name: String,
    pub description: Option<String>,
    /// Number of candidates referencing this category.
    /// Deletion is only permitted while this is zero.
    pub candidate_count: u32,
    pub created_at: DateTime<Utc>,
}

impl CategoryCore {
    /// Create a new, empty category.
    pub fn new(name: String, description: Option<String>) -> Self {
        Self {
            name,
            description,
            candidate_count: 0,
            created_at: Utc::now(),
        }
    }
}

/// A category without an ID.
pub type NewCategory = CategoryCore;

/// A category from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub category: CategoryCore,
}

impl Deref for Category {
    type Target = CategoryCore;

    fn deref(&self) -> &Self::Target {
        &self.category
    }
}

impl DerefMut for Category {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.category
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl CategoryCore {
        pub fn example() -> Self {
            Self::new(
                "Best Dancer".to_string(),
                Some("Smoothest moves of the year".to_string()),
            )
        }

        pub fn example2() -> Self {
            Self::new("Most Fashionable".to_string(), None)
        }
    }
}
