use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::{
    api::{category::non_blank, id::ApiId},
    db::candidate::{Candidate, NewCandidate},
};

/// A candidate as submitted by an admin, for creation or replacement.
///
/// Tallies are not editable, so there is no vote count field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CandidateSpec {
    pub category_id: ApiId,
    pub name: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub faculty: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl CandidateSpec {
    /// Trim all fields, dropping blank optional ones, and reject a blank name.
    pub fn normalized(self) -> Result<Self, Error> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation("candidate name must not be empty".to_string()));
        }
        Ok(Self {
            category_id: self.category_id,
            name,
            department: non_blank(self.department),
            faculty: non_blank(self.faculty),
            image_url: non_blank(self.image_url),
        })
    }
}

impl TryFrom<CandidateSpec> for NewCandidate {
    type Error = Error;

    /// A new candidate starts with no votes.
    fn try_from(spec: CandidateSpec) -> Result<Self, Self::Error> {
        let spec = spec.normalized()?;
        Ok(Self {
            category_id: spec.category_id.into(),
            name: spec.name,
            department: spec.department,
            faculty: spec.faculty,
            image_url: spec.image_url,
            vote_count: 0,
            created_at: Utc::now(),
        })
    }
}

/// API-friendly representation of a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDescription {
    pub id: ApiId,
    pub category_id: ApiId,
    pub name: String,
    pub department: Option<String>,
    pub faculty: Option<String>,
    pub image_url: Option<String>,
    pub vote_count: u64,
    pub created_at: DateTime<Utc>,
}

impl From<Candidate> for CandidateDescription {
    fn from(candidate: Candidate) -> Self {
        let core = candidate.candidate;
        Self {
            id: candidate.id.into(),
            category_id: core.category_id.into(),
            name: core.name,
            department: core.department,
            faculty: core.faculty,
            image_url: core.image_url,
            vote_count: core.vote_count,
            created_at: core.created_at,
        }
    }
}


#[cfg(test)]
mod tests {
    use rocket::serde::json;

    use crate::model::mongodb::Id;

    use super::*;

    #[test]
    fn new_candidate_has_no_votes() {
        let category_id = Id::new();
        let candidate = NewCandidate::try_from(CandidateSpec::example(category_id)).unwrap();
        assert_eq!(candidate.vote_count, 0);
        assert_eq!(candidate.category_id, category_id);
    }

    #[test]
    fn rejects_blank_name() {
        let spec = CandidateSpec::named(Id::new(), "   ");
        assert!(matches!(
            NewCandidate::try_from(spec),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn vote_count_cannot_be_submitted() {
        let body = format!(
            r#"{{"category_id": "{}", "name": "Sneaky", "vote_count": 1000}}"#,
            Id::new()
        );
        assert!(json::from_str::<CandidateSpec>(&body).is_err());
    }
}
