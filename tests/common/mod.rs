#![allow(dead_code)]
// fixtures shared by the integration tests

use std::sync::Once;
use time::OffsetDateTime;
use voter_store::logging;
use voter_store::{CacheVoterStore, Config, PollId, PollParticipation, Voter, VoterId, VoterStore};

pub const TEST_REDIS_URL_ENV: &str = "VOTER_TEST_REDIS_URL";

const FIRST_NAMES: [&str; 8] = ["Ann", "Bo", "Cy", "Dee", "Eli", "Fay", "Gus", "Hal"];
const LAST_NAMES: [&str; 6] = ["West", "Ortiz", "Nakamura", "Okafor", "Lind", "Park"];
const DOMAINS: [&str; 3] = ["example.com", "mail.test", "voters.org"];

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        let config = Config::from_env().unwrap_or_default();
        if let Err(e) = logging::init(&config) {
            eprintln!("logging already initialized: {}", e);
        }
    });
}

fn pick<'a>(list: &[&'a str]) -> &'a str {
    list[fastrand::usize(..list.len())]
}

pub fn rand_voter(id: VoterId) -> Voter {
    let first = pick(&FIRST_NAMES);
    let last = pick(&LAST_NAMES);
    let email = format!(
        "{}.{}{}@{}",
        first.to_lowercase(),
        last.to_lowercase(),
        fastrand::u16(..1000),
        pick(&DOMAINS)
    );

    Voter::new(id, format!("{} {}", first, last), email)
}

/// a timestamp between 2000 and 2030 with a random sub-second part
pub fn rand_date() -> OffsetDateTime {
    let seconds = fastrand::i64(946_684_800..1_893_456_000);
    OffsetDateTime::from_unix_timestamp(seconds)
        .and_then(|dt| dt.replace_nanosecond(fastrand::u32(..1_000_000_000)))
        .expect("timestamp should be in range")
}

pub fn rand_poll(poll_id: PollId) -> PollParticipation {
    PollParticipation::new(poll_id, fastrand::u32(1..=100), rand_date())
}

pub fn rand_tag() -> String {
    (0..10).map(|_| fastrand::alphanumeric()).collect()
}

/// a cache store under a private key prefix, when a test redis is configured
pub async fn cache_store() -> Option<CacheVoterStore> {
    cache_store_at(&format!("test-voter-{}:", rand_tag())).await
}

pub async fn cache_store_at(prefix: &str) -> Option<CacheVoterStore> {
    let url = std::env::var(TEST_REDIS_URL_ENV).ok()?;
    let store = CacheVoterStore::new(&url, prefix)
        .await
        .expect("test redis url should be valid");
    assert!(
        store.status().await.is_ok(),
        "test redis at {} is not reachable",
        url
    );

    Some(store)
}
