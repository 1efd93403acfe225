use async_std::sync::Mutex;
use domain_keys::keys::RouteKey;
use log::*;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use service_uptime::Uptime;

use crate::config::redis_url;
use crate::error::{Result, StoreError};
use crate::status::{RequestTally, StoreState, StoreStatus, DOWN, OK};
use crate::store::{BulkOutcome, VoterStore};
use crate::voter::{PollId, PollParticipation, Voter, VoterId};

/// Voter store persisted in redis, one json document per voter at
/// `<prefix><voter_id>`.
///
/// Poll history changes read the whole document, change it, and write it back.
/// That sequence is not atomic: two writers touching the same voter race and
/// the last write wins.
pub struct CacheVoterStore {
    id: String,
    url: String,
    prefix: String,
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    uptime: Uptime,
    tally: RequestTally,
}

impl std::fmt::Debug for CacheVoterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheVoterStore")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("prefix", &self.prefix)
            .field("uptime", &self.uptime)
            .field("tally", &self.tally)
            .finish()
    }
}

impl CacheVoterStore {
    /// Create the store and try the backend once. An unreachable backend is
    /// logged and the store is returned anyway; only a malformed address fails.
    pub async fn new(address: &str, prefix: &str) -> Result<CacheVoterStore> {
        let url = redis_url(address);
        debug!("using redis url: {}", url);

        let client = redis::Client::open(url.as_str())?;
        let store = CacheVoterStore {
            id: RouteKey::create(),
            url,
            prefix: prefix.to_string(),
            client,
            connection: Mutex::new(None),
            uptime: Uptime::new(),
            tally: RequestTally::default(),
        };

        match store.ping().await {
            Ok(()) => info!("voter store {} connected to {}", store.id, store.url),
            Err(e) => warn!(
                "error connecting to redis at {}: {}; cache might not be available, continuing...",
                store.url, e
            ),
        }

        Ok(store)
    }

    pub fn id(&self) -> String {
        self.id.to_string()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn key(&self, voter_id: VoterId) -> String {
        format!("{}{}", self.prefix, voter_id)
    }

    // KEYS takes a glob, so the prefix's own glob characters are escaped
    fn pattern(&self) -> String {
        let mut pattern = String::with_capacity(self.prefix.len() + 1);
        for ch in self.prefix.chars() {
            if matches!(ch, '\\' | '*' | '?' | '[' | ']') {
                pattern.push('\\');
            }
            pattern.push(ch);
        }
        pattern.push('*');

        pattern
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let result: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                self.reset().await;
                Err(e.into())
            }
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut cached = self.connection.lock().await;
        if let Some(conn) = cached.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self.client.get_multiplexed_async_connection().await?;
        *cached = Some(conn.clone());

        Ok(conn)
    }

    // drop the cached connection so the next call reconnects
    async fn reset(&self) {
        self.connection.lock().await.take();
    }

    // count the outcome; a backend failure also discards the connection
    async fn finish<T>(&self, result: Result<T>) -> Result<T> {
        self.tally.record(&result);
        if let Err(e) = &result {
            if e.is_unavailable() {
                warn!("voter store {}: {}", self.id, e);
                self.reset().await;
            }
        }

        result
    }

    async fn fetch(&self, conn: &mut MultiplexedConnection, key: &str) -> Result<Option<Voter>> {
        let payload: Option<String> = conn.get(key).await?;
        match payload {
            Some(js) => {
                let voter = serde_json::from_str(&js).map_err(|e| {
                    StoreError::unavailable(format!("undecodable document at {}: {}", key, e))
                })?;
                Ok(Some(voter))
            }
            None => Ok(None),
        }
    }

    async fn load(&self, conn: &mut MultiplexedConnection, voter_id: VoterId) -> Result<Voter> {
        self.fetch(conn, &self.key(voter_id))
            .await?
            .ok_or(StoreError::VoterNotFound(voter_id))
    }

    // a document that will not encode is the caller's input, not a backend fault
    fn encode(voter: &Voter) -> Result<String> {
        serde_json::to_string(voter).map_err(|e| StoreError::Unencodable {
            voter_id: voter.voter_id,
            reason: e.to_string(),
        })
    }

    async fn insert(&self, voter: &Voter) -> Result<()> {
        voter.validate()?;
        let js = Self::encode(voter)?;
        let mut conn = self.connection().await?;

        // NX keeps creation unique even with concurrent writers
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(voter.voter_id))
            .arg(js)
            .arg("NX")
            .query_async(&mut conn)
            .await?;

        match reply {
            Some(_) => Ok(()),
            None => Err(StoreError::VoterExists(voter.voter_id)),
        }
    }

    async fn read(&self, voter_id: VoterId) -> Result<Voter> {
        let mut conn = self.connection().await?;
        self.load(&mut conn, voter_id).await
    }

    /// read the voter, apply the change to the copy, write the whole document back
    async fn modify<F>(&self, voter_id: VoterId, change: F) -> Result<()>
    where
        F: FnOnce(&mut Voter) -> Result<()>,
    {
        let mut conn = self.connection().await?;
        let mut voter = self.load(&mut conn, voter_id).await?;
        change(&mut voter)?;

        let js = Self::encode(&voter)?;

        // XX: a voter deleted since the read is not brought back
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(voter_id))
            .arg(js)
            .arg("XX")
            .query_async(&mut conn)
            .await?;

        match reply {
            Some(_) => Ok(()),
            None => Err(StoreError::VoterNotFound(voter_id)),
        }
    }

    async fn remove(&self, voter_id: VoterId) -> Result<()> {
        let mut conn = self.connection().await?;
        let count: usize = conn.del(self.key(voter_id)).await?;
        if count == 0 {
            return Err(StoreError::VoterNotFound(voter_id));
        }

        Ok(())
    }

    async fn keys(&self, conn: &mut MultiplexedConnection) -> Result<Vec<String>> {
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(self.pattern())
            .query_async(conn)
            .await?;

        Ok(keys)
    }

    async fn list(&self) -> Result<Vec<Voter>> {
        let mut conn = self.connection().await?;
        let keys = self.keys(&mut conn).await?;

        let mut voters = Vec::with_capacity(keys.len());
        for key in keys {
            match self.fetch(&mut conn, &key).await {
                Ok(Some(voter)) => voters.push(voter),
                // removed between KEYS and GET
                Ok(None) => debug!("voter key vanished: {}", key),
                Err(e) => warn!("error getting voter from redis, skipping {}: {}", key, e),
            }
        }

        Ok(voters)
    }

    async fn clear(&self) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();

        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("error connecting to redis: {}", e);
                outcome.fail(self.pattern(), e);
                return outcome;
            }
        };

        let keys = match self.keys(&mut conn).await {
            Ok(keys) => keys,
            Err(e) => {
                error!("error getting keys from redis: {}", e);
                outcome.fail(self.pattern(), e);
                return outcome;
            }
        };

        for key in keys {
            let result: redis::RedisResult<usize> = conn.del(&key).await;
            match result {
                Ok(count) => outcome.removed += count,
                Err(e) => {
                    error!("error deleting voter {} from redis: {}", key, e);
                    outcome.fail(key, e);
                }
            }
        }

        info!(
            "removed {} voters under {}, {} failures",
            outcome.removed,
            self.prefix,
            outcome.failures.len()
        );

        outcome
    }
}

impl VoterStore for CacheVoterStore {
    async fn add_voter(&self, voter: Voter) -> Result<()> {
        let result = self.insert(&voter).await;
        self.finish(result).await
    }

    async fn get_voter(&self, voter_id: VoterId) -> Result<Voter> {
        let result = self.read(voter_id).await;
        self.finish(result).await
    }

    async fn get_all_voters(&self) -> Vec<Voter> {
        match self.list().await {
            Ok(voters) => {
                self.tally.record_success();
                voters
            }
            Err(e) => {
                warn!("voter store {}: list failed: {}", self.id, e);
                self.tally.record_failure();
                self.reset().await;
                vec![]
            }
        }
    }

    async fn delete_all_voters(&self) -> BulkOutcome {
        let outcome = self.clear().await;
        if outcome.is_complete() {
            self.tally.record_success();
        } else {
            self.tally.record_failure();
            self.reset().await;
        }

        outcome
    }

    async fn update_voter(&self, voter: Voter, voter_id: VoterId) -> Result<()> {
        let result = match voter.check_identity(voter_id) {
            Ok(()) => {
                self.modify(voter_id, |existing| {
                    existing.update_contact(voter);
                    Ok(())
                })
                .await
            }
            Err(e) => Err(e),
        };

        self.finish(result).await
    }

    async fn delete_voter(&self, voter_id: VoterId) -> Result<()> {
        let result = self.remove(voter_id).await;
        self.finish(result).await
    }

    async fn get_voter_polls(&self, voter_id: VoterId) -> Result<Vec<PollParticipation>> {
        let result = self.read(voter_id).await.map(|voter| voter.poll_history);
        self.finish(result).await
    }

    async fn add_voter_poll(&self, entry: PollParticipation, voter_id: VoterId) -> Result<()> {
        let result = self
            .modify(voter_id, |voter| voter.add_poll(entry))
            .await;
        self.finish(result).await
    }

    async fn get_voter_poll(
        &self,
        voter_id: VoterId,
        poll_id: PollId,
    ) -> Result<PollParticipation> {
        let result = self
            .read(voter_id)
            .await
            .and_then(|voter| voter.poll(poll_id).cloned());
        self.finish(result).await
    }

    async fn update_voter_poll(
        &self,
        entry: PollParticipation,
        voter_id: VoterId,
        poll_id: PollId,
    ) -> Result<()> {
        let result = self
            .modify(voter_id, |voter| voter.replace_poll(entry, poll_id))
            .await;
        self.finish(result).await
    }

    async fn delete_voter_poll(&self, voter_id: VoterId, poll_id: PollId) -> Result<()> {
        let result = self
            .modify(voter_id, |voter| voter.remove_poll(poll_id).map(|_| ()))
            .await;
        self.finish(result).await
    }

    async fn status(&self) -> StoreStatus {
        let (status, state) = match self.ping().await {
            Ok(()) => (OK, StoreState::Idle),
            Err(e) => {
                warn!("voter store {} status ping failed: {}", self.id, e);
                (DOWN, StoreState::Broken)
            }
        };

        StoreStatus::new(
            self.id(),
            status.to_string(),
            state,
            self.uptime.to_string(),
            self.uptime.get_uptime_seconds(),
            &self.tally,
        )
    }
}
