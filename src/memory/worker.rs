use anyhow::Result;
use async_channel::{bounded, Receiver, Sender};
use domain_keys::keys::RouteKey;
use hashbrown::HashMap;
use log::*;
use service_uptime::Uptime;
use std::sync::Arc;

use crate::error::{self, StoreError};
use crate::status::{RequestTally, StoreState, StoreStatus, DOWN, OK};
use crate::store::{BulkOutcome, VoterStore};
use crate::voter::{PollId, PollParticipation, Voter, VoterId};

pub type Responder<T> = Sender<error::Result<T>>;

#[derive(Debug, Clone)]
pub enum Command {
    AddVoter(Voter, Responder<()>),
    GetVoter(VoterId, Responder<Voter>),
    GetAllVoters(Sender<Vec<Voter>>),
    DeleteAllVoters(Sender<BulkOutcome>),
    UpdateVoter(Voter, VoterId, Responder<()>),
    DeleteVoter(VoterId, Responder<()>),
    GetVoterPolls(VoterId, Responder<Vec<PollParticipation>>),
    AddVoterPoll(PollParticipation, VoterId, Responder<()>),
    GetVoterPoll(VoterId, PollId, Responder<PollParticipation>),
    UpdateVoterPoll(PollParticipation, VoterId, PollId, Responder<()>),
    DeleteVoterPoll(VoterId, PollId, Responder<()>),
    Len(Sender<usize>),
    Status(Sender<StoreStatus>), // request the worker's status
    Shutdown,
}

pub type VoterMap = HashMap<VoterId, Voter>;

pub fn add_voter(voters: &mut VoterMap, voter: Voter) -> error::Result<()> {
    voter.validate()?;
    if voters.contains_key(&voter.voter_id) {
        return Err(StoreError::VoterExists(voter.voter_id));
    }

    voters.insert(voter.voter_id, voter);
    Ok(())
}

pub fn get_voter(voters: &VoterMap, voter_id: VoterId) -> error::Result<&Voter> {
    voters
        .get(&voter_id)
        .ok_or(StoreError::VoterNotFound(voter_id))
}

fn get_voter_mut(voters: &mut VoterMap, voter_id: VoterId) -> error::Result<&mut Voter> {
    voters
        .get_mut(&voter_id)
        .ok_or(StoreError::VoterNotFound(voter_id))
}

pub fn update_voter(voters: &mut VoterMap, voter: Voter, voter_id: VoterId) -> error::Result<()> {
    voter.check_identity(voter_id)?;
    get_voter_mut(voters, voter_id)?.update_contact(voter);
    Ok(())
}

pub fn delete_voter(voters: &mut VoterMap, voter_id: VoterId) -> error::Result<()> {
    voters
        .remove(&voter_id)
        .map(|_| ())
        .ok_or(StoreError::VoterNotFound(voter_id))
}

pub fn add_voter_poll(
    voters: &mut VoterMap,
    entry: PollParticipation,
    voter_id: VoterId,
) -> error::Result<()> {
    get_voter_mut(voters, voter_id)?.add_poll(entry)
}

pub fn update_voter_poll(
    voters: &mut VoterMap,
    entry: PollParticipation,
    voter_id: VoterId,
    poll_id: PollId,
) -> error::Result<()> {
    get_voter_mut(voters, voter_id)?.replace_poll(entry, poll_id)
}

pub fn delete_voter_poll(
    voters: &mut VoterMap,
    voter_id: VoterId,
    poll_id: PollId,
) -> error::Result<()> {
    get_voter_mut(voters, voter_id)?.remove_poll(poll_id)?;
    Ok(())
}

// the handler loop; the map lives here and nowhere else. the tally is shared
// with the handles so the counts outlive the worker
pub async fn handler(id: String, rx: Receiver<Command>, tally: Arc<RequestTally>) -> Result<()> {
    let uptime = Uptime::new();
    let state = StoreState::Idle;
    let mut error_count = 0u64;

    let mut voters: VoterMap = HashMap::new();

    // now read and respond to requests
    while let Ok(cmd) = rx.recv().await {
        debug!("recv cmd: {:?}", cmd);
        match cmd {
            Command::AddVoter(voter, tx) => {
                let result = add_voter(&mut voters, voter);
                error_count += send_result(result, &tally, tx).await;
            }
            Command::GetVoter(voter_id, tx) => {
                let result = get_voter(&voters, voter_id).cloned();
                error_count += send_result(result, &tally, tx).await;
            }
            Command::GetAllVoters(tx) => {
                let list: Vec<Voter> = voters.values().cloned().collect();
                tally.record_success();
                error_count += send_response(list, tx).await;
            }
            Command::DeleteAllVoters(tx) => {
                let removed = voters.len();
                voters.clear();
                info!("removed all {} voters", removed);
                tally.record_success();
                error_count += send_response(BulkOutcome::removed(removed), tx).await;
            }
            Command::UpdateVoter(voter, voter_id, tx) => {
                let result = update_voter(&mut voters, voter, voter_id);
                error_count += send_result(result, &tally, tx).await;
            }
            Command::DeleteVoter(voter_id, tx) => {
                let result = delete_voter(&mut voters, voter_id);
                error_count += send_result(result, &tally, tx).await;
            }
            Command::GetVoterPolls(voter_id, tx) => {
                let result = get_voter(&voters, voter_id).map(|v| v.poll_history.clone());
                error_count += send_result(result, &tally, tx).await;
            }
            Command::AddVoterPoll(entry, voter_id, tx) => {
                let result = add_voter_poll(&mut voters, entry, voter_id);
                error_count += send_result(result, &tally, tx).await;
            }
            Command::GetVoterPoll(voter_id, poll_id, tx) => {
                let result = get_voter(&voters, voter_id)
                    .and_then(|v| v.poll(poll_id))
                    .cloned();
                error_count += send_result(result, &tally, tx).await;
            }
            Command::UpdateVoterPoll(entry, voter_id, poll_id, tx) => {
                let result = update_voter_poll(&mut voters, entry, voter_id, poll_id);
                error_count += send_result(result, &tally, tx).await;
            }
            Command::DeleteVoterPoll(voter_id, poll_id, tx) => {
                let result = delete_voter_poll(&mut voters, voter_id, poll_id);
                error_count += send_result(result, &tally, tx).await;
            }
            Command::Len(tx) => {
                error_count += send_response(voters.len(), tx).await;
            }
            Command::Status(tx) => {
                let status = StoreStatus::new(
                    id.to_string(),
                    OK.to_string(),
                    state.clone(),
                    uptime.to_string(),
                    uptime.get_uptime_seconds(),
                    &tally,
                );

                info!("status response: {}", status.to_json());
                error_count += send_response(status, tx).await;
            }
            Command::Shutdown => {
                info!(
                    "worker id: {}, state: {:?}, undelivered responses: {}",
                    id,
                    StoreState::Shutdown,
                    error_count
                );
                break;
            }
        }
    }

    // helper functions
    async fn send_result<T>(
        result: error::Result<T>,
        tally: &RequestTally,
        tx: Responder<T>,
    ) -> u64 {
        tally.record(&result);
        send_response(result, tx).await
    }

    async fn send_response<T>(msg: T, tx: Sender<T>) -> u64 {
        if let Err(e) = tx.send(msg).await {
            error!("error sending response, receiver gone: {}", e);
            1u64
        } else {
            0u64
        }
    }

    rx.close();

    Ok(())
}

/// Handle to an in-memory voter store. The voters live inside a worker task;
/// every clone of the handle talks to the same worker.
#[derive(Debug, Clone)]
pub struct MemoryVoterStore {
    id: String,
    uptime: Uptime,
    tally: Arc<RequestTally>,
    request_tx: Sender<Command>,
}

impl Default for MemoryVoterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryVoterStore {
    /// create and start a new store worker.
    pub fn new() -> MemoryVoterStore {
        let uptime = Uptime::new();
        let id = RouteKey::create();

        // this is for the store struct
        let wid = id.clone();

        info!("starting up voter store worker, id: {}", id);

        let (request_tx, request_receiver) = bounded(250);
        let tally = Arc::new(RequestTally::default());
        let worker_tally = tally.clone();

        // run the handler loop as a background task
        async_std::task::spawn(async move {
            match handler(id.clone(), request_receiver, worker_tally).await {
                Ok(()) => info!("worker handler exit for worker id: {}", id),
                Err(e) => error!("worker exit with error: {:?}", e),
            }
        });

        MemoryVoterStore {
            id: wid,
            uptime,
            tally,
            request_tx,
        }
    }

    /// return the worker's id
    pub fn id(&self) -> String {
        self.id.to_string()
    }

    /// return the worker's uptime as days, hours, minutes, seconds
    pub fn get_uptime(&self) -> String {
        self.uptime.to_string()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.uptime.get_uptime_seconds()
    }

    /// the number of stored voters; zero once the worker is gone
    pub async fn len(&self) -> usize {
        self.request(Command::Len).await.unwrap_or(0)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// stop the worker; every handle fails with BackendUnavailable afterwards
    pub async fn shutdown(&self) -> error::Result<()> {
        self.request_tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| StoreError::unavailable("voter store worker already shut down"))
    }

    async fn request<T>(&self, build: impl FnOnce(Sender<T>) -> Command) -> Option<T> {
        let (responder, rx) = bounded(1);
        if let Err(e) = self.request_tx.send(build(responder)).await {
            error!("error sending request to worker {}: {}", self.id, e);
            return None;
        }

        rx.recv().await.ok()
    }

    async fn call<T>(&self, build: impl FnOnce(Responder<T>) -> Command) -> error::Result<T> {
        match self.request(build).await {
            Some(result) => result,
            None => {
                self.tally.record_failure();
                Err(StoreError::unavailable("voter store worker has shut down"))
            }
        }
    }
}

impl VoterStore for MemoryVoterStore {
    async fn add_voter(&self, voter: Voter) -> error::Result<()> {
        self.call(|tx| Command::AddVoter(voter, tx)).await
    }

    async fn get_voter(&self, voter_id: VoterId) -> error::Result<Voter> {
        self.call(|tx| Command::GetVoter(voter_id, tx)).await
    }

    async fn get_all_voters(&self) -> Vec<Voter> {
        match self.request(Command::GetAllVoters).await {
            Some(voters) => voters,
            None => {
                self.tally.record_failure();
                vec![]
            }
        }
    }

    async fn delete_all_voters(&self) -> BulkOutcome {
        match self.request(Command::DeleteAllVoters).await {
            Some(outcome) => outcome,
            None => {
                self.tally.record_failure();
                let mut outcome = BulkOutcome::default();
                outcome.fail(self.id(), "voter store worker has shut down");
                outcome
            }
        }
    }

    async fn update_voter(&self, voter: Voter, voter_id: VoterId) -> error::Result<()> {
        self.call(|tx| Command::UpdateVoter(voter, voter_id, tx))
            .await
    }

    async fn delete_voter(&self, voter_id: VoterId) -> error::Result<()> {
        self.call(|tx| Command::DeleteVoter(voter_id, tx)).await
    }

    async fn get_voter_polls(&self, voter_id: VoterId) -> error::Result<Vec<PollParticipation>> {
        self.call(|tx| Command::GetVoterPolls(voter_id, tx)).await
    }

    async fn add_voter_poll(
        &self,
        entry: PollParticipation,
        voter_id: VoterId,
    ) -> error::Result<()> {
        self.call(|tx| Command::AddVoterPoll(entry, voter_id, tx))
            .await
    }

    async fn get_voter_poll(
        &self,
        voter_id: VoterId,
        poll_id: PollId,
    ) -> error::Result<PollParticipation> {
        self.call(|tx| Command::GetVoterPoll(voter_id, poll_id, tx))
            .await
    }

    async fn update_voter_poll(
        &self,
        entry: PollParticipation,
        voter_id: VoterId,
        poll_id: PollId,
    ) -> error::Result<()> {
        self.call(|tx| Command::UpdateVoterPoll(entry, voter_id, poll_id, tx))
            .await
    }

    async fn delete_voter_poll(&self, voter_id: VoterId, poll_id: PollId) -> error::Result<()> {
        self.call(|tx| Command::DeleteVoterPoll(voter_id, poll_id, tx))
            .await
    }

    async fn status(&self) -> StoreStatus {
        match self.request(Command::Status).await {
            Some(status) => status,
            None => StoreStatus::new(
                self.id(),
                DOWN.to_string(),
                StoreState::Shutdown,
                self.get_uptime(),
                self.get_uptime_seconds(),
                &self.tally,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn entry(poll_id: PollId, vote_id: u32) -> PollParticipation {
        PollParticipation::new(poll_id, vote_id, datetime!(2023-03-01 12:00:00 UTC))
    }

    #[test]
    fn map_operations() {
        let mut voters = VoterMap::new();
        add_voter(&mut voters, Voter::new(1, "Ann", "a@x")).unwrap();
        assert_eq!(
            add_voter(&mut voters, Voter::new(1, "Other", "o@x")),
            Err(StoreError::VoterExists(1))
        );
        assert_eq!(get_voter(&voters, 1).unwrap().name, "Ann");

        add_voter_poll(&mut voters, entry(5, 9), 1).unwrap();
        assert!(add_voter_poll(&mut voters, entry(5, 9), 2).unwrap_err().is_not_found());

        update_voter(&mut voters, Voter::new(1, "Anne", "anne@x"), 1).unwrap();
        let voter = get_voter(&voters, 1).unwrap();
        assert_eq!(voter.email, "anne@x");
        assert_eq!(voter.poll_history, vec![entry(5, 9)]);

        delete_voter_poll(&mut voters, 1, 5).unwrap();
        assert!(get_voter(&voters, 1).unwrap().poll_history.is_empty());

        delete_voter(&mut voters, 1).unwrap();
        assert_eq!(delete_voter(&mut voters, 1), Err(StoreError::VoterNotFound(1)));
    }

    #[test]
    fn update_rejects_other_voter_body() {
        let mut voters = VoterMap::new();
        add_voter(&mut voters, Voter::new(1, "Ann", "a@x")).unwrap();
        add_voter(&mut voters, Voter::new(2, "Bo", "b@x")).unwrap();

        let err = update_voter(&mut voters, Voter::new(2, "Mallory", "m@x"), 1).unwrap_err();
        assert_eq!(err, StoreError::VoterIdMismatch { expected: 1, actual: 2 });
        assert_eq!(get_voter(&voters, 1).unwrap().name, "Ann");
        assert_eq!(get_voter(&voters, 2).unwrap().name, "Bo");
    }

    #[test]
    fn new() {
        async_std::task::block_on(async move {
            let store = MemoryVoterStore::new();
            assert_eq!(store.id().len(), 16);
            assert_eq!(store.get_uptime_seconds(), 0);
            assert!(store.is_empty().await);

            let status = store.status().await;
            println!("{}", status.to_json());
            assert_eq!(status.store_id, store.id());
            assert_eq!(status.status, OK);
            assert_eq!(status.state, StoreState::Idle);

            assert!(store.shutdown().await.is_ok());
        });
    }

    #[test]
    fn add_get_remove() {
        async_std::task::block_on(async move {
            let store = MemoryVoterStore::new();
            let voter = Voter::new(1, "Ann", "a@x");

            store.add_voter(voter.clone()).await.unwrap();
            assert_eq!(store.len().await, 1);
            assert_eq!(store.get_voter(1).await.unwrap(), voter);

            // clones share the same worker
            let other = store.clone();
            assert_eq!(other.get_all_voters().await, vec![voter]);

            other.delete_voter(1).await.unwrap();
            assert!(store.is_empty().await);
            assert!(store.get_voter(1).await.unwrap_err().is_not_found());

            let status = store.status().await;
            assert_eq!(status.successful_requests, 4);
            assert_eq!(status.failed_requests, 1);

            assert!(store.shutdown().await.is_ok());
        });
    }

    #[test]
    fn concurrent_adds() {
        async_std::task::block_on(async move {
            let store = MemoryVoterStore::new();

            let tasks: Vec<_> = (0..50u32)
                .map(|n| {
                    let store = store.clone();
                    async_std::task::spawn(async move {
                        let voter = Voter::new(n % 10, format!("voter {}", n), "v@x");
                        store.add_voter(voter).await.is_ok()
                    })
                })
                .collect();

            let mut added = 0;
            for task in tasks {
                if task.await {
                    added += 1;
                }
            }

            assert_eq!(added, 10);
            assert_eq!(store.len().await, 10);
        });
    }

    #[test]
    fn after_shutdown() {
        async_std::task::block_on(async move {
            let store = MemoryVoterStore::new();
            store.add_voter(Voter::new(1, "Ann", "a@x")).await.unwrap();
            store.shutdown().await.unwrap();

            // wait for the worker to drain the shutdown command
            let mut down = false;
            for _ in 0..100 {
                if store.request_tx.is_closed() {
                    down = true;
                    break;
                }
                async_std::task::sleep(std::time::Duration::from_millis(10)).await;
            }
            assert!(down);

            let err = store.add_voter(Voter::new(2, "Bo", "b@x")).await.unwrap_err();
            assert!(err.is_unavailable());
            assert!(store.get_all_voters().await.is_empty());
            assert!(!store.delete_all_voters().await.is_complete());
            assert!(store.shutdown().await.is_err());

            let status = store.status().await;
            assert_eq!(status.status, DOWN);
            assert_eq!(status.state, StoreState::Shutdown);

            // the add before shutdown, then the three calls after it
            assert_eq!(status.successful_requests, 1);
            assert_eq!(status.failed_requests, 3);
        });
    }
}
