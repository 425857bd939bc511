//! Error taxonomy for the tracker.
//!
//! Everything below the supervisor returns [TrackerError]; the supervisor is the only place
//! that decides whether to retry (transport, store, invariant) or shut down ([TrackerError::Cancelled]).

use crate::config::ConfigError;
use crate::store::StoreError;
use crate::window::WindowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("block {0} not found")]
    BlockNotFound(u64),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("confirmation window invariant violated: {0}")]
    Window(#[from] WindowError),
    #[error("tracker cancelled")]
    Cancelled,
}

impl TrackerError {
    /// True if the error is the cooperative shutdown signal rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TrackerError::Cancelled)
    }
}
