use serde::{Deserialize, Serialize};

use crate::model::api::{candidate::CandidateDescription, category::CategoryDescription};

/// Headline numbers for the admin dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub candidate_count: u64,
    pub total_votes: u64,
    pub category_count: u64,
}

/// The leading candidates of one category, best first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStanding {
    pub category: CategoryDescription,
    pub candidates: Vec<CandidateDescription>,
}

/// Cross-check of candidate tallies against identity voting records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyAudit {
    /// Sum of every candidate's vote count.
    pub total_votes: u64,
    /// Number of set voted-category flags across all identities.
    pub recorded_votes: u64,
    /// Whether the two agree. Only meaningful when no votes are in flight.
    pub consistent: bool,
}

impl TallyAudit {
    pub fn new(total_votes: u64, recorded_votes: u64) -> Self {
        Self {
            total_votes,
            recorded_votes,
            consistent: total_votes == recorded_votes,
        }
    }
}

/// The global voting switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingSwitch {
    pub enabled: bool,
}
