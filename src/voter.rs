/// voter and poll participation records
///
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::{Result, StoreError};

pub type VoterId = u32;
pub type PollId = u32;
pub type VoteId = u32;

/// one vote cast by a voter in a specific poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollParticipation {
    pub poll_id: PollId,
    pub vote_id: VoteId,
    #[serde(with = "time::serde::rfc3339")]
    pub vote_date: OffsetDateTime,
}

impl PollParticipation {
    pub fn new(poll_id: PollId, vote_id: VoteId, vote_date: OffsetDateTime) -> PollParticipation {
        PollParticipation {
            poll_id,
            vote_id,
            vote_date,
        }
    }

    /// the vote date must be writable as rfc 3339: a year in 0..=9999 and an
    /// offset without a seconds part
    pub fn validate(&self) -> Result<()> {
        self.vote_date
            .format(&Rfc3339)
            .map(|_| ())
            .map_err(|e| StoreError::InvalidVoteDate {
                poll_id: self.poll_id,
                reason: e.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voter {
    pub voter_id: VoterId,
    pub name: String,
    pub email: String,
    #[serde(
        rename = "voteHistory",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub poll_history: Vec<PollParticipation>,
}

impl Voter {
    /// create a voter with an empty poll history
    pub fn new(voter_id: VoterId, name: impl Into<String>, email: impl Into<String>) -> Voter {
        Voter {
            voter_id,
            name: name.into(),
            email: email.into(),
            poll_history: vec![],
        }
    }

    /// reject a history that repeats a poll id or holds an unwritable date
    pub fn validate(&self) -> Result<()> {
        for (idx, entry) in self.poll_history.iter().enumerate() {
            entry.validate()?;
            if self.poll_history[..idx]
                .iter()
                .any(|prev| prev.poll_id == entry.poll_id)
            {
                return Err(StoreError::PollExists {
                    voter_id: self.voter_id,
                    poll_id: entry.poll_id,
                });
            }
        }

        Ok(())
    }

    /// the body of an update must name the same voter as the caller's voter_id
    pub fn check_identity(&self, voter_id: VoterId) -> Result<()> {
        if self.voter_id != voter_id {
            return Err(StoreError::VoterIdMismatch {
                expected: voter_id,
                actual: self.voter_id,
            });
        }

        Ok(())
    }

    /// replace name and email; the poll history is left alone
    pub fn update_contact(&mut self, from: Voter) {
        self.name = from.name;
        self.email = from.email;
    }

    pub fn poll(&self, poll_id: PollId) -> Result<&PollParticipation> {
        self.poll_history
            .iter()
            .find(|entry| entry.poll_id == poll_id)
            .ok_or(StoreError::PollNotFound {
                voter_id: self.voter_id,
                poll_id,
            })
    }

    /// append to the end of the history
    pub fn add_poll(&mut self, entry: PollParticipation) -> Result<()> {
        entry.validate()?;
        if self.position(entry.poll_id).is_some() {
            return Err(StoreError::PollExists {
                voter_id: self.voter_id,
                poll_id: entry.poll_id,
            });
        }

        self.poll_history.push(entry);
        Ok(())
    }

    /// replace in place; poll_id always wins over the entry's own id
    pub fn replace_poll(&mut self, mut entry: PollParticipation, poll_id: PollId) -> Result<()> {
        let idx = self.position(poll_id).ok_or(StoreError::PollNotFound {
            voter_id: self.voter_id,
            poll_id,
        })?;

        entry.poll_id = poll_id;
        entry.validate()?;
        self.poll_history[idx] = entry;
        Ok(())
    }

    pub fn remove_poll(&mut self, poll_id: PollId) -> Result<PollParticipation> {
        let idx = self.position(poll_id).ok_or(StoreError::PollNotFound {
            voter_id: self.voter_id,
            poll_id,
        })?;

        Ok(self.poll_history.remove(idx))
    }

    fn position(&self, poll_id: PollId) -> Option<usize> {
        self.poll_history
            .iter()
            .position(|entry| entry.poll_id == poll_id)
    }
}
