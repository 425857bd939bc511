//! Tracker configuration.

use crate::filter::{event_topic, LogFilter};
use alloy::primitives::{Address, B256};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_NUM_BLOCK_CONFIRMATIONS: u64 = 6;
pub const DEFAULT_SYNC_BATCH_SIZE: u64 = 20;
pub const DEFAULT_MAX_BACKLOG_SIZE: u64 = 10_000;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid contract address {0:?}")]
    InvalidAddress(String),
    #[error("invalid event topic {0:?}")]
    InvalidTopic(String),
    #[error("{0}")]
    Invalid(&'static str),
}

/// Tracker configuration.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// JSON-RPC URL of a node on the tracked chain.
    pub rpc_endpoint: String,
    /// First block to track. Only used while the store has no later watermark.
    pub start_block: u64,
    /// Blocks that must be built on top of a block before its logs are processed
    /// (3 means block 10 is processed once block 13 is seen).
    pub num_block_confirmations: u64,
    /// Blocks fetched per batch while resynchronizing.
    pub sync_batch_size: u64,
    /// Resync never replays more than this many blocks below the latest head.
    pub max_backlog_size: u64,
    /// Interval between latest-block polls.
    pub poll_interval: Duration,
    /// Fixed delay before the supervisor restarts after a failure.
    pub retry_backoff: Duration,
    /// Tracked contracts and the event topics accepted from each.
    pub log_filter: LogFilter,
}

impl TrackerConfig {
    /// Config with default depth, batch, backlog and timing settings.
    pub fn new(rpc_endpoint: impl Into<String>, log_filter: LogFilter) -> Self {
        Self {
            rpc_endpoint: rpc_endpoint.into(),
            start_block: 0,
            num_block_confirmations: DEFAULT_NUM_BLOCK_CONFIRMATIONS,
            sync_batch_size: DEFAULT_SYNC_BATCH_SIZE,
            max_backlog_size: DEFAULT_MAX_BACKLOG_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            log_filter,
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(s)?;
        let config = raw.try_into()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_json_str(&s)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_endpoint.is_empty() {
            return Err(ConfigError::Invalid("rpc_endpoint must not be empty"));
        }
        if self.sync_batch_size == 0 {
            return Err(ConfigError::Invalid("sync_batch_size must be > 0"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("poll_interval must be > 0"));
        }
        if self.log_filter.is_empty() {
            return Err(ConfigError::Invalid("log_filter must track at least one contract"));
        }
        Ok(())
    }

    /// Watermark to start from: the stored one, unless `start_block` is further ahead.
    pub fn effective_last_processed(&self, stored: u64) -> u64 {
        self.start_block.saturating_sub(1).max(stored)
    }
}

/// On-disk shape: durations in milliseconds, topics as hashes or event signatures.
#[derive(Debug, Deserialize)]
struct RawConfig {
    rpc_endpoint: String,
    #[serde(default)]
    start_block: u64,
    #[serde(default = "default_confirmations")]
    num_block_confirmations: u64,
    #[serde(default = "default_batch")]
    sync_batch_size: u64,
    #[serde(default = "default_backlog")]
    max_backlog_size: u64,
    #[serde(default = "default_poll_ms")]
    poll_interval_ms: u64,
    #[serde(default = "default_backoff_ms")]
    retry_backoff_ms: u64,
    log_filter: HashMap<String, Vec<String>>,
}

fn default_confirmations() -> u64 {
    DEFAULT_NUM_BLOCK_CONFIRMATIONS
}

fn default_batch() -> u64 {
    DEFAULT_SYNC_BATCH_SIZE
}

fn default_backlog() -> u64 {
    DEFAULT_MAX_BACKLOG_SIZE
}

fn default_poll_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_backoff_ms() -> u64 {
    DEFAULT_RETRY_BACKOFF.as_millis() as u64
}

/// `0x`-prefixed 32-byte hash as-is, anything else is hashed as an event signature.
fn parse_topic(s: &str) -> Result<B256, ConfigError> {
    if s.starts_with("0x") {
        B256::from_str(s).map_err(|_| ConfigError::InvalidTopic(s.to_string()))
    } else if s.contains('(') && s.ends_with(')') {
        Ok(event_topic(s))
    } else {
        Err(ConfigError::InvalidTopic(s.to_string()))
    }
}

impl TryFrom<RawConfig> for TrackerConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, ConfigError> {
        let mut log_filter = LogFilter::new();
        for (address, topics) in &raw.log_filter {
            let address =
                Address::from_str(address).map_err(|_| ConfigError::InvalidAddress(address.clone()))?;
            for topic in topics {
                log_filter.insert(address, parse_topic(topic)?);
            }
        }
        let config = TrackerConfig {
            rpc_endpoint: raw.rpc_endpoint,
            start_block: raw.start_block,
            num_block_confirmations: raw.num_block_confirmations,
            sync_batch_size: raw.sync_batch_size,
            max_backlog_size: raw.max_backlog_size,
            poll_interval: Duration::from_millis(raw.poll_interval_ms),
            retry_backoff: Duration::from_millis(raw.retry_backoff_ms),
            log_filter,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

    #[test]
    fn parses_full_config() {
        let json = format!(
            r#"{{
                "rpc_endpoint": "http://127.0.0.1:8545",
                "start_block": 100000,
                "num_block_confirmations": 10,
                "sync_batch_size": 50,
                "max_backlog_size": 5000,
                "poll_interval_ms": 500,
                "retry_backoff_ms": 250,
                "log_filter": {{
                    "{ADDR}": [
                        "Transfer(address,address,uint256)",
                        "0x0000000000000000000000000000000000000000000000000000000000000001"
                    ]
                }}
            }}"#
        );
        let c = TrackerConfig::from_json_str(&json).unwrap();
        assert_eq!(c.start_block, 100_000);
        assert_eq!(c.num_block_confirmations, 10);
        assert_eq!(c.sync_batch_size, 50);
        assert_eq!(c.max_backlog_size, 5000);
        assert_eq!(c.poll_interval, Duration::from_millis(500));
        assert_eq!(c.retry_backoff, Duration::from_millis(250));
        let address = Address::from_str(ADDR).unwrap();
        let topics = c.log_filter.topics(&address).unwrap();
        assert!(topics.contains(&event_topic("Transfer(address,address,uint256)")));
        assert!(topics.contains(&B256::with_last_byte(1)));
    }

    #[test]
    fn defaults_apply() {
        let json = format!(r#"{{"rpc_endpoint": "http://x", "log_filter": {{"{ADDR}": ["Ping()"]}}}}"#);
        let c = TrackerConfig::from_json_str(&json).unwrap();
        assert_eq!(c.start_block, 0);
        assert_eq!(c.num_block_confirmations, DEFAULT_NUM_BLOCK_CONFIRMATIONS);
        assert_eq!(c.sync_batch_size, DEFAULT_SYNC_BATCH_SIZE);
        assert_eq!(c.max_backlog_size, DEFAULT_MAX_BACKLOG_SIZE);
        assert_eq!(c.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(c.retry_backoff, DEFAULT_RETRY_BACKOFF);
    }

    #[test]
    fn rejects_bad_values() {
        let zero_batch = format!(
            r#"{{"rpc_endpoint": "http://x", "sync_batch_size": 0, "log_filter": {{"{ADDR}": ["Ping()"]}}}}"#
        );
        assert!(matches!(
            TrackerConfig::from_json_str(&zero_batch),
            Err(ConfigError::Invalid(_))
        ));
        let bad_addr = r#"{"rpc_endpoint": "http://x", "log_filter": {"0x1234": ["Ping()"]}}"#;
        assert!(matches!(
            TrackerConfig::from_json_str(bad_addr),
            Err(ConfigError::InvalidAddress(_))
        ));
        let bad_topic = format!(r#"{{"rpc_endpoint": "http://x", "log_filter": {{"{ADDR}": ["Ping"]}}}}"#);
        assert!(matches!(
            TrackerConfig::from_json_str(&bad_topic),
            Err(ConfigError::InvalidTopic(_))
        ));
        let empty_filter = r#"{"rpc_endpoint": "http://x", "log_filter": {}}"#;
        assert!(matches!(
            TrackerConfig::from_json_str(empty_filter),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            TrackerConfig::from_json_str("{"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn effective_last_processed() {
        let mut c = TrackerConfig::new("http://x", LogFilter::new());
        assert_eq!(c.effective_last_processed(0), 0);
        assert_eq!(c.effective_last_processed(42), 42);
        c.start_block = 100;
        assert_eq!(c.effective_last_processed(0), 99);
        assert_eq!(c.effective_last_processed(150), 150);
        assert_eq!(c.effective_last_processed(50), 99);
    }
}
