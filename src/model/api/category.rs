use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::{
    api::id::ApiId,
    db::category::{Category, NewCategory},
};

/// A category as submitted by an admin, for creation or replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategorySpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CategorySpec {
    /// Trim all fields, dropping blank optional ones, and reject a blank name.
    pub fn normalized(self) -> Result<Self, Error> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation("category name must not be empty".to_string()));
        }
        Ok(Self {
            name,
            description: non_blank(self.description),
        })
    }
}

impl TryFrom<CategorySpec> for NewCategory {
    type Error = Error;

    fn try_from(spec: CategorySpec) -> Result<Self, Self::Error> {
        let spec = spec.normalized()?;
        Ok(NewCategory::new(spec.name, spec.description))
    }
}

/// Trim an optional string, treating blank as absent.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// API-friendly representation of a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDescription {
    pub id: ApiId,
    pub name: String,
    pub description: Option<String>,
    pub candidate_count: u32,
    pub created_at: DateTime<Utc>,
}

impl From<Category> for CategoryDescription {
    fn from(category: Category) -> Self {
        Self {
            id: category.id.into(),
            name: category.category.name,
            description: category.category.description,
            candidate_count: category.category.candidate_count,
            created_at: category.category.created_at,
        }
    }
}
