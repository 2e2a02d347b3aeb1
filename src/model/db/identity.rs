use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    api::auth::Principal,
    common::role::Role,
    mongodb::{serde_string_map, Id},
};

/// Display name given to identities whose provider supplied none.
pub const ANONYMOUS: &str = "Anonymous";

/// The opaque, stable user ID assigned by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Uid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uid {
    fn from(uid: &str) -> Self {
        Self(uid.to_string())
    }
}

impl From<String> for Uid {
    fn from(uid: String) -> Self {
        Self(uid)
    }
}

/// An authenticated principal's voting record, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "_id")]
    pub id: Uid,
    pub email: Option<String>,
    pub name: String,
    pub role: Role,
    /// Maps category IDs to whether this identity has voted in that category.
    #[serde(default, with = "serde_string_map")]
    pub voted_categories: HashMap<Id, bool>,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    /// A fresh identity for the given principal, with the default role and no votes.
    pub fn new(principal: &Principal) -> Self {
        Self {
            id: principal.id.clone(),
            email: principal.email.clone(),
            name: principal
                .name
                .clone()
                .unwrap_or_else(|| ANONYMOUS.to_string()),
            role: Role::default(),
            voted_categories: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Has this identity already voted in the given category?
    pub fn has_voted(&self, category_id: Id) -> bool {
        self.voted_categories
            .get(&category_id)
            .copied()
            .unwrap_or(false)
    }

    /// The categories this identity has voted in.
    pub fn voted(&self) -> impl Iterator<Item = Id> + '_ {
        self.voted_categories
            .iter()
            .filter(|(_, voted)| **voted)
            .map(|(id, _)| *id)
    }

    /// The name of the document field holding the flag for the given category.
    pub fn voted_field(category_id: Id) -> String {
        format!("voted_categories.{}", category_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_identity_defaults() {
        let principal = Principal {
            id: "uid-1".into(),
            email: Some("ada@example.com".to_string()),
            name: None,
        };
        let identity = Identity::new(&principal);
        assert_eq!(identity.role, Role::Voter);
        assert_eq!(identity.name, ANONYMOUS);
        assert_eq!(identity.voted().count(), 0);
    }

    #[test]
    fn voted_flags() {
        let principal = Principal::example_voter();
        let mut identity = Identity::new(&principal);
        let (voted, unvoted, cleared) = (Id::new(), Id::new(), Id::new());
        identity.voted_categories.insert(voted, true);
        identity.voted_categories.insert(cleared, false);

        assert!(identity.has_voted(voted));
        assert!(!identity.has_voted(unvoted));
        assert!(!identity.has_voted(cleared));
        assert_eq!(identity.voted().collect::<Vec<_>>(), vec![voted]);
        assert_eq!(
            Identity::voted_field(voted),
            format!("voted_categories.{}", voted.to_hex())
        );
    }
}
