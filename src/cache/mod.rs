/// redis backed voter store.
///
/// This is the level 2 store: one step away from the app, shared by every
/// process pointed at the same redis, and as durable as that redis is
/// configured to be. Voters are kept as whole json documents under a fixed
/// key prefix so that bulk operations can find everything the store owns.
///
/// Construction never depends on the backend being up; an unreachable redis
/// shows up as `BackendUnavailable` on the first operation instead.
///
pub mod store;

pub use store::CacheVoterStore;
