use serde::{Deserialize, Serialize};

/// Document ID of the voting status singleton.
pub const VOTING_STATUS_ID: &str = "votingStatus";

/// The global voting-enabled flag, stored as `settings/votingStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingStatus {
    #[serde(rename = "_id")]
    pub id: String,
    pub is_voting_enabled: bool,
}

impl VotingStatus {
    /// The value assumed by the first read of a missing flag.
    pub const DEFAULT_ENABLED: bool = true;
}
