/// the voter store contract shared by every backend
///
use serde::{Deserialize, Serialize};

use crate::cache::CacheVoterStore;
use crate::config::{BackendKind, Config};
use crate::error::{Result, StoreError};
use crate::memory::MemoryVoterStore;
use crate::status::StoreStatus;
use crate::voter::{PollId, PollParticipation, Voter, VoterId};

/// CRUD over voters and their poll participation history.
///
/// Every backend must behave identically from the caller's side: the same
/// inputs produce the same results and the same `StoreError` kinds. Calls are
/// independent of each other; nothing is atomic across calls.
#[allow(async_fn_in_trait)]
pub trait VoterStore {
    /// store a new voter; fails with `VoterExists` if the id is taken
    async fn add_voter(&self, voter: Voter) -> Result<()>;

    async fn get_voter(&self, voter_id: VoterId) -> Result<Voter>;

    /// every stored voter in no particular order; never an error
    async fn get_all_voters(&self) -> Vec<Voter>;

    /// remove every voter; best effort, failures are reported in the outcome
    async fn delete_all_voters(&self) -> BulkOutcome;

    /// replace name and email of `voter_id`, leaving the poll history alone
    async fn update_voter(&self, voter: Voter, voter_id: VoterId) -> Result<()>;

    async fn delete_voter(&self, voter_id: VoterId) -> Result<()>;

    async fn get_voter_polls(&self, voter_id: VoterId) -> Result<Vec<PollParticipation>>;

    /// append to the voter's history; fails with `PollExists` on a repeated poll id
    async fn add_voter_poll(&self, entry: PollParticipation, voter_id: VoterId) -> Result<()>;

    async fn get_voter_poll(&self, voter_id: VoterId, poll_id: PollId)
        -> Result<PollParticipation>;

    /// replace the entry matching `poll_id` in place; `poll_id` overrides `entry.poll_id`
    async fn update_voter_poll(
        &self,
        entry: PollParticipation,
        voter_id: VoterId,
        poll_id: PollId,
    ) -> Result<()>;

    async fn delete_voter_poll(&self, voter_id: VoterId, poll_id: PollId) -> Result<()>;

    async fn status(&self) -> StoreStatus;
}

/// a key that could not be processed by a bulk operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkFailure {
    pub key: String,
    pub reason: String,
}

/// the report of a best-effort bulk operation
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub removed: usize,
    pub failures: Vec<BulkFailure>,
}

impl BulkOutcome {
    pub fn removed(removed: usize) -> BulkOutcome {
        BulkOutcome {
            removed,
            failures: vec![],
        }
    }

    pub fn fail(&mut self, key: impl Into<String>, reason: impl ToString) {
        self.failures.push(BulkFailure {
            key: key.into(),
            reason: reason.to_string(),
        });
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// for strict callers: any per-key failure becomes an aggregate error
    pub fn into_result(self) -> Result<usize> {
        if self.is_complete() {
            Ok(self.removed)
        } else {
            Err(StoreError::BulkIncomplete {
                removed: self.removed,
                failed: self.failures.len(),
            })
        }
    }
}

/// the backend selected by configuration
#[derive(Debug)]
pub enum AnyVoterStore {
    Memory(MemoryVoterStore),
    Cache(CacheVoterStore),
}

impl AnyVoterStore {
    /// open the configured backend; an unreachable cache does not fail here
    pub async fn open(config: &Config) -> Result<AnyVoterStore> {
        let store = match config.backend {
            BackendKind::Memory => AnyVoterStore::Memory(MemoryVoterStore::new()),
            BackendKind::Cache => AnyVoterStore::Cache(
                CacheVoterStore::new(&config.redis_address, &config.key_prefix).await?,
            ),
        };

        Ok(store)
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            AnyVoterStore::Memory(_) => BackendKind::Memory,
            AnyVoterStore::Cache(_) => BackendKind::Cache,
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            AnyVoterStore::Memory($store) => $call,
            AnyVoterStore::Cache($store) => $call,
        }
    };
}

impl VoterStore for AnyVoterStore {
    async fn add_voter(&self, voter: Voter) -> Result<()> {
        dispatch!(self, store => store.add_voter(voter).await)
    }

    async fn get_voter(&self, voter_id: VoterId) -> Result<Voter> {
        dispatch!(self, store => store.get_voter(voter_id).await)
    }

    async fn get_all_voters(&self) -> Vec<Voter> {
        dispatch!(self, store => store.get_all_voters().await)
    }

    async fn delete_all_voters(&self) -> BulkOutcome {
        dispatch!(self, store => store.delete_all_voters().await)
    }

    async fn update_voter(&self, voter: Voter, voter_id: VoterId) -> Result<()> {
        dispatch!(self, store => store.update_voter(voter, voter_id).await)
    }

    async fn delete_voter(&self, voter_id: VoterId) -> Result<()> {
        dispatch!(self, store => store.delete_voter(voter_id).await)
    }

    async fn get_voter_polls(&self, voter_id: VoterId) -> Result<Vec<PollParticipation>> {
        dispatch!(self, store => store.get_voter_polls(voter_id).await)
    }

    async fn add_voter_poll(&self, entry: PollParticipation, voter_id: VoterId) -> Result<()> {
        dispatch!(self, store => store.add_voter_poll(entry, voter_id).await)
    }

    async fn get_voter_poll(
        &self,
        voter_id: VoterId,
        poll_id: PollId,
    ) -> Result<PollParticipation> {
        dispatch!(self, store => store.get_voter_poll(voter_id, poll_id).await)
    }

    async fn update_voter_poll(
        &self,
        entry: PollParticipation,
        voter_id: VoterId,
        poll_id: PollId,
    ) -> Result<()> {
        dispatch!(self, store => store.update_voter_poll(entry, voter_id, poll_id).await)
    }

    async fn delete_voter_poll(&self, voter_id: VoterId, poll_id: PollId) -> Result<()> {
        dispatch!(self, store => store.delete_voter_poll(voter_id, poll_id).await)
    }

    async fn status(&self) -> StoreStatus {
        dispatch!(self, store => store.status().await)
    }
}
