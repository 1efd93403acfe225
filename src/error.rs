use thiserror::Error;

use crate::voter::{PollId, VoterId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("voter already exists: {0}")]
    VoterExists(VoterId),
    #[error("voter does not exist: {0}")]
    VoterNotFound(VoterId),
    #[error("poll already exists: voter {voter_id}, poll {poll_id}")]
    PollExists { voter_id: VoterId, poll_id: PollId },
    #[error("poll does not exist: voter {voter_id}, poll {poll_id}")]
    PollNotFound { voter_id: VoterId, poll_id: PollId },
    #[error("voter id mismatch: expected {expected}, body has {actual}")]
    VoterIdMismatch { expected: VoterId, actual: VoterId },
    #[error("invalid vote date for poll {poll_id}: {reason}")]
    InvalidVoteDate { poll_id: PollId, reason: String },
    #[error("unencodable voter {voter_id}: {reason}")]
    Unencodable { voter_id: VoterId, reason: String },
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("bulk operation incomplete: {removed} removed, {failed} failed")]
    BulkIncomplete { removed: usize, failed: usize },
}

impl StoreError {
    pub fn unavailable(reason: impl Into<String>) -> StoreError {
        StoreError::BackendUnavailable(reason.into())
    }

    /// a voter or poll entry with the same identity is already present
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            StoreError::VoterExists(_) | StoreError::PollExists { .. }
        )
    }

    /// the referenced voter does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::VoterNotFound(_))
    }

    /// the voter exists but the referenced poll entry does not
    pub fn is_poll_not_found(&self) -> bool {
        matches!(self, StoreError::PollNotFound { .. })
    }

    /// the input was rejected before reaching any backend
    pub fn is_invalid(&self) -> bool {
        matches!(
            self,
            StoreError::VoterIdMismatch { .. }
                | StoreError::InvalidVoteDate { .. }
                | StoreError::Unencodable { .. }
        )
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::BackendUnavailable(_))
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::BackendUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::BackendUnavailable(format!("undecodable document: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
