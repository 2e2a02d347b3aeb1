use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    common::role::Role,
    db::identity::{Identity, Uid},
};

/// API-friendly representation of the caller's own identity and voting record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDescription {
    pub id: Uid,
    pub email: Option<String>,
    pub name: String,
    pub role: Role,
    /// Categories already voted in, so clients can disable further voting there.
    pub voted_categories: Vec<ApiId>,
}

impl From<Identity> for IdentityDescription {
    fn from(identity: Identity) -> Self {
        let mut voted_categories: Vec<ApiId> = identity.voted().map(ApiId::from).collect();
        voted_categories.sort();
        Self {
            id: identity.id,
            email: identity.email,
            name: identity.name,
            role: identity.role,
            voted_categories,
        }
    }
}
