//! Durable store for the watermark and the tracked logs.
//!
//! The store only promises atomic single writes. Logs are upserted by [LogKey], so writing the
//! same range twice (crash between the log write and the watermark write) is harmless.

use crate::types::{Log, LogKey};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Backend(String),
}

/// Persistence used by the tracker: last processed block plus every accepted log.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Last block whose logs were recorded; 0 if nothing was ever recorded.
    async fn last_processed_block(&self) -> Result<u64, StoreError>;

    async fn insert_last_processed_block(&self, block: u64) -> Result<(), StoreError>;

    /// Upsert `logs`; re-inserting a known log replaces it.
    async fn insert_logs(&self, logs: &[Log]) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    last_processed_block: u64,
    logs: Vec<Log>,
}

#[derive(Debug, Default)]
struct IndexedState {
    last_processed_block: u64,
    logs: BTreeMap<LogKey, Log>,
}

impl IndexedState {
    fn upsert(&mut self, logs: &[Log]) {
        for log in logs {
            self.logs.insert(log.key(), log.clone());
        }
    }

    fn snapshot(&self) -> StoreState {
        StoreState {
            last_processed_block: self.last_processed_block,
            logs: self.logs.values().cloned().collect(),
        }
    }
}

impl From<StoreState> for IndexedState {
    fn from(state: StoreState) -> Self {
        let mut indexed = IndexedState {
            last_processed_block: state.last_processed_block,
            logs: BTreeMap::new(),
        };
        indexed.upsert(&state.logs);
        indexed
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<IndexedState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a watermark, as after an earlier run.
    pub fn with_last_processed_block(block: u64) -> Self {
        Self {
            state: RwLock::new(IndexedState {
                last_processed_block: block,
                logs: BTreeMap::new(),
            }),
        }
    }

    /// Stored logs ordered by (block_number, transaction_hash, log_index).
    pub async fn logs(&self) -> Vec<Log> {
        self.state.read().await.logs.values().cloned().collect()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn last_processed_block(&self) -> Result<u64, StoreError> {
        Ok(self.state.read().await.last_processed_block)
    }

    async fn insert_last_processed_block(&self, block: u64) -> Result<(), StoreError> {
        self.state.write().await.last_processed_block = block;
        Ok(())
    }

    async fn insert_logs(&self, logs: &[Log]) -> Result<(), StoreError> {
        self.state.write().await.upsert(logs);
        Ok(())
    }
}

/// JSON file store. Every write rewrites the file through a temp file, an fsync and a rename.
///
/// The whole log history is serialized on each write, so a write costs O(stored logs). Fine for
/// a single bridge contract; larger deployments want a real database behind [EventStore].
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<IndexedState>,
}

impl JsonFileStore {
    /// Open `path`, starting empty if the file does not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<StoreState>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(
            path = %path.display(),
            last_processed_block = state.last_processed_block,
            num_logs = state.logs.len(),
            "opened event store"
        );
        Ok(Self {
            path,
            state: Mutex::new(state.into()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn logs(&self) -> Vec<Log> {
        self.state.lock().await.logs.values().cloned().collect()
    }

    async fn persist(&self, state: &IndexedState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(&state.snapshot())?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for JsonFileStore {
    async fn last_processed_block(&self) -> Result<u64, StoreError> {
        Ok(self.state.lock().await.last_processed_block)
    }

    async fn insert_last_processed_block(&self, block: u64) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let previous = state.last_processed_block;
        state.last_processed_block = block;
        if let Err(e) = self.persist(&state).await {
            state.last_processed_block = previous;
            return Err(e);
        }
        Ok(())
    }

    async fn insert_logs(&self, logs: &[Log]) -> Result<(), StoreError> {
        if logs.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        let previous: Vec<(LogKey, Option<Log>)> = logs
            .iter()
            .map(|l| (l.key(), state.logs.get(&l.key()).cloned()))
            .collect();
        state.upsert(logs);
        if let Err(e) = self.persist(&state).await {
            for (key, old) in previous {
                match old {
                    Some(log) => state.logs.insert(key, log),
                    None => state.logs.remove(&key),
                };
            }
            return Err(e);
        }
        Ok(())
    }
}
