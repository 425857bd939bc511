//! Common helpers for integration tests: an in-memory chain behind [BlockProvider] and a
//! recording subscriber.
//! Some helpers are only used by specific test binaries; allow dead_code to avoid per-binary warnings.
#![allow(dead_code)]

use alloy::primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tracker::{
    BlockHeader, BlockNumber, BlockProvider, EventStore, EventSubscriber, Log, LogQuery,
    MemoryStore, StoreError, TrackerError,
};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tracker=debug".parse().unwrap()))
        .with_test_writer()
        .try_init();
}

fn block_hash(fork: u64, number: u64) -> B256 {
    let mut b = [0u8; 32];
    b[..8].copy_from_slice(&fork.to_be_bytes());
    b[24..].copy_from_slice(&number.to_be_bytes());
    B256::from(b)
}

struct ChainState {
    blocks: BTreeMap<u64, BlockHeader>,
    fork: u64,
    logs: Vec<Log>,
    fail_get_logs: usize,
    fail_get_block: usize,
    block_requests: Vec<u64>,
    log_queries: Vec<(u64, u64)>,
}

/// Canonical chain `0..=head`, mined and reorganized on demand.
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new(height: u64) -> Self {
        let mut blocks = BTreeMap::new();
        for n in 0..=height {
            blocks.insert(
                n,
                BlockHeader {
                    number: n,
                    hash: block_hash(0, n),
                    parent_hash: block_hash(0, n.saturating_sub(1)),
                    timestamp: n * 12,
                },
            );
        }
        Self {
            state: Mutex::new(ChainState {
                blocks,
                fork: 0,
                logs: Vec::new(),
                fail_get_logs: 0,
                fail_get_block: 0,
                block_requests: Vec::new(),
                log_queries: Vec::new(),
            }),
        }
    }

    pub fn head(&self) -> BlockHeader {
        let state = self.state.lock().unwrap();
        state.blocks.values().next_back().cloned().unwrap()
    }

    pub fn block(&self, number: u64) -> BlockHeader {
        self.state.lock().unwrap().blocks[&number].clone()
    }

    /// Append `n` blocks on top of the current head.
    pub fn mine(&self, n: u64) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..n {
            let parent = state.blocks.values().next_back().cloned().unwrap();
            let number = parent.number + 1;
            let fork = state.fork;
            state.blocks.insert(
                number,
                BlockHeader {
                    number,
                    hash: block_hash(fork, number),
                    parent_hash: parent.hash,
                    timestamp: number * 12,
                },
            );
        }
    }

    /// Replace every block from `height` up with a new fork of `new_len` blocks.
    pub fn reorg(&self, height: u64, new_len: u64) {
        let mut state = self.state.lock().unwrap();
        state.fork += 1;
        let _ = state.blocks.split_off(&height);
        drop(state);
        self.mine(new_len);
    }

    pub fn add_log(&self, log: Log) {
        self.state.lock().unwrap().logs.push(log);
    }

    pub fn fail_next_get_logs(&self, n: usize) {
        self.state.lock().unwrap().fail_get_logs = n;
    }

    pub fn fail_next_get_block(&self, n: usize) {
        self.state.lock().unwrap().fail_get_block = n;
    }

    /// Block numbers requested explicitly (not `latest`), in request order.
    pub fn block_requests(&self) -> Vec<u64> {
        self.state.lock().unwrap().block_requests.clone()
    }

    pub fn log_queries(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().log_queries.clone()
    }
}

#[async_trait]
impl BlockProvider for MockChain {
    async fn get_block_by_hash(&self, hash: B256) -> Result<Option<BlockHeader>, TrackerError> {
        let state = self.state.lock().unwrap();
        Ok(state.blocks.values().find(|b| b.hash == hash).cloned())
    }

    async fn get_block_by_number(
        &self,
        number: BlockNumber,
    ) -> Result<Option<BlockHeader>, TrackerError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_get_block > 0 {
            state.fail_get_block -= 1;
            return Err(TrackerError::Rpc("connection refused".into()));
        }
        match number {
            BlockNumber::Latest => Ok(state.blocks.values().next_back().cloned()),
            BlockNumber::Number(n) => {
                state.block_requests.push(n);
                Ok(state.blocks.get(&n).cloned())
            }
        }
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<Log>, TrackerError> {
        let mut state = self.state.lock().unwrap();
        state.log_queries.push((query.from_block, query.to_block));
        if state.fail_get_logs > 0 {
            state.fail_get_logs -= 1;
            return Err(TrackerError::Rpc("getLogs timeout".into()));
        }
        Ok(state
            .logs
            .iter()
            .filter(|l| {
                l.block_number >= query.from_block
                    && l.block_number <= query.to_block
                    && query.addresses.contains(&l.address)
            })
            .cloned()
            .collect())
    }
}

/// Provider whose calls never complete, like a node that accepted the connection and hung.
pub struct HangingProvider;

#[async_trait]
impl BlockProvider for HangingProvider {
    async fn get_block_by_hash(&self, _hash: B256) -> Result<Option<BlockHeader>, TrackerError> {
        std::future::pending().await
    }

    async fn get_block_by_number(
        &self,
        _number: BlockNumber,
    ) -> Result<Option<BlockHeader>, TrackerError> {
        std::future::pending().await
    }

    async fn get_logs(&self, _query: &LogQuery) -> Result<Vec<Log>, TrackerError> {
        std::future::pending().await
    }
}

/// [MemoryStore] whose next watermark writes fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_watermark: Mutex<usize>,
}

impl FlakyStore {
    pub fn fail_next_watermark_writes(&self, n: usize) {
        *self.fail_watermark.lock().unwrap() = n;
    }

    pub async fn logs(&self) -> Vec<Log> {
        self.inner.logs().await
    }
}

#[async_trait]
impl EventStore for FlakyStore {
    async fn last_processed_block(&self) -> Result<u64, StoreError> {
        self.inner.last_processed_block().await
    }

    async fn insert_last_processed_block(&self, block: u64) -> Result<(), StoreError> {
        {
            let mut remaining = self.fail_watermark.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Backend("disk full".into()));
            }
        }
        self.inner.insert_last_processed_block(block).await
    }

    async fn insert_logs(&self, logs: &[Log]) -> Result<(), StoreError> {
        self.inner.insert_logs(logs).await
    }
}

pub fn log_at(address: Address, topic0: B256, block_number: u64, log_index: u64) -> Log {
    Log {
        address,
        topics: vec![topic0],
        data: Bytes::from(block_number.to_be_bytes().to_vec()),
        block_number,
        block_hash: block_hash(0, block_number),
        transaction_hash: B256::repeat_byte(0x42),
        log_index,
    }
}

/// Records every forwarded log.
#[derive(Default)]
pub struct RecordingSubscriber {
    logs: Mutex<Vec<Log>>,
}

impl RecordingSubscriber {
    pub fn block_numbers(&self) -> Vec<u64> {
        self.logs.lock().unwrap().iter().map(|l| l.block_number).collect()
    }

    pub fn len(&self) -> usize {
        self.logs.lock().unwrap().len()
    }
}

impl EventSubscriber for RecordingSubscriber {
    fn add_log(&self, log: &Log) {
        self.logs.lock().unwrap().push(log.clone());
    }
}

/// Poll `cond` every 5ms until it holds; panics after `secs` seconds.
pub async fn wait_until<F, Fut>(secs: u64, what: &str, mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let res = tokio::time::timeout(Duration::from_secs(secs), async {
        while !cond().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    if res.is_err() {
        panic!("timed out waiting for {}", what);
    }
}
