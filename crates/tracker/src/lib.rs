//! Off-chain event tracker: head-following, confirmation-depth finalization, and durable
//! ingestion of contract logs.
//!
//! - **EventTracker**: polls the chain head, keeps unconfirmed headers in a [BlockWindow], and
//!   once a block has enough confirmations fetches its logs, filters them through a [LogFilter],
//!   forwards matches to an [EventSubscriber] and records them in an [EventStore]. Gaps and
//!   reorgs trigger a batched resync capped by `max_backlog_size`. Runs under a restart-forever
//!   supervisor until stopped.
//! - **QuorumPool**: buckets signed messages by subject and reports when enough distinct
//!   signatures have been collected for one subject.

pub mod config;
pub mod error;
pub mod filter;
pub mod poller;
pub mod provider;
pub mod quorum;
pub mod store;
pub mod subscriber;
pub mod tracker;
pub mod types;
pub mod window;

pub use config::{ConfigError, TrackerConfig};
pub use error::TrackerError;
pub use filter::{event_topic, LogFilter, LogQuery};
pub use poller::HeadPoller;
pub use provider::{BlockProvider, HttpBlockProvider};
pub use quorum::{QuorumPool, SignedMessage};
pub use store::{EventStore, JsonFileStore, MemoryStore, StoreError};
pub use subscriber::EventSubscriber;
pub use tracker::{EventTracker, TrackerState};
pub use types::{BlockHeader, BlockNumber, Log};
pub use window::{BlockWindow, SyncStatus, WindowError};
