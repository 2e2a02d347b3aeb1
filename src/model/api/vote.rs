use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::api::id::ApiId;

/// A request to vote for a candidate in a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub category_id: ApiId,
    pub candidate_id: ApiId,
}

/// Proof of an accepted vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub category_id: ApiId,
    pub candidate_id: ApiId,
    pub cast_at: DateTime<Utc>,
}

/// Why a vote was not accepted. These are expected outcomes, shown directly to the voter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rejection {
    VotingDisabled,
    Unauthenticated,
    InvalidCandidate,
    AlreadyVoted,
}

impl Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::VotingDisabled => "voting is currently disabled",
            Self::Unauthenticated => "no eligible identity for this vote",
            Self::InvalidCandidate => "candidate does not stand in this category",
            Self::AlreadyVoted => "already voted in this category",
        })
    }
}

/// The result of a cast attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    Accepted(VoteReceipt),
    Rejected(Rejection),
}

impl VoteOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// The rejection reason, if any.
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(reason) => Some(*reason),
        }
    }
}
