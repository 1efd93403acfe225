/// in-process voter store.
///
/// This is the level 1 store: closest to the app and the fastest, with no
/// persistence across restarts. A single worker task owns the voter map and
/// answers commands sent over a bounded channel, so concurrent callers are
/// serialized without a lock around the map.
///
pub mod worker;

pub use worker::MemoryVoterStore;
