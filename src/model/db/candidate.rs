use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core candidate data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCore {
    pub category_id: Id,
    pub name: String,
    pub department: Option<String>,
    pub faculty: Option<String>,
    pub image_url: Option<String>,
    /// Authoritative tally. Written only by the vote commit.
    pub vote_count: u64,
    pub created_at: DateTime<Utc>,
}

impl CandidateCore {
    /// Does this candidate match the search text?
    /// Matching is a case-insensitive substring test on the name, department and faculty.
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        std::iter::once(Some(&self.name))
            .chain([self.department.as_ref(), self.faculty.as_ref()])
            .flatten()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}

/// A candidate without an ID.
pub type NewCandidate = CandidateCore;

/// A candidate from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub candidate: CandidateCore,
}

impl Deref for Candidate {
    type Target = CandidateCore;

    fn deref(&self) -> &Self::Target {
        &self.candidate
    }
}

impl DerefMut for Candidate {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.candidate
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl CandidateCore {
        pub fn example(category_id: Id) -> Self {
            Self {
                category_id,
                name: "Ada Obi".to_string(),
                department: Some("Computer Science".to_string()),
                faculty: Some("Engineering".to_string()),
                image_url: None,
                vote_count: 0,
                created_at: Utc::now(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_is_case_insensitive_across_fields() {
        let candidate = CandidateCore::example(Id::new());
        assert!(candidate.matches("ada"));
        assert!(candidate.matches("SCIENCE"));
        assert!(candidate.matches("engin"));
        assert!(!candidate.matches("law"));
    }
}
