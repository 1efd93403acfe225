#![doc = include_str!("../README.md")]

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod memory;
pub mod status;
pub mod store;
pub mod voter;

pub use cache::CacheVoterStore;
pub use config::{BackendKind, Config};
pub use error::{Result, StoreError};
pub use memory::MemoryVoterStore;
pub use status::{StoreState, StoreStatus};
pub use store::{AnyVoterStore, BulkFailure, BulkOutcome, VoterStore};
pub use voter::{PollId, PollParticipation, VoteId, Voter, VoterId};

/// the current app version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
