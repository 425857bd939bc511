//! Log filter table and the `eth_getLogs` query built from it.

use crate::types::Log;
use alloy::primitives::{Address, B256};
use serde_json::{json, Value};
use sha3::{Digest, Keccak256};
use std::collections::{HashMap, HashSet};

/// Topic0 of an event: keccak256 of its canonical signature, e.g. `Transfer(address,address,uint256)`.
pub fn event_topic(signature: &str) -> B256 {
    let mut hasher = Keccak256::new();
    hasher.update(signature.as_bytes());
    B256::from_slice(&hasher.finalize())
}

/// Accepted event topics per contract address. Fixed for the lifetime of a tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    events: HashMap<Address, HashSet<B256>>,
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `topic` from `address`.
    pub fn with_event(mut self, address: Address, topic: B256) -> Self {
        self.insert(address, topic);
        self
    }

    pub fn insert(&mut self, address: Address, topic: B256) {
        self.events.entry(address).or_default().insert(topic);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Contract addresses to query, sorted so the query is stable between passes.
    pub fn addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.events.keys().copied().collect();
        addresses.sort();
        addresses
    }

    pub fn topics(&self, address: &Address) -> Option<&HashSet<B256>> {
        self.events.get(address)
    }

    /// True iff the log's address is tracked and its topic0 is accepted for that address.
    pub fn accepts(&self, log: &Log) -> bool {
        match (self.events.get(&log.address), log.topic0()) {
            (Some(topics), Some(topic0)) => topics.contains(topic0),
            _ => false,
        }
    }

    /// Query for `[from_block, to_block]` across every tracked address.
    pub fn query(&self, from_block: u64, to_block: u64) -> LogQuery {
        LogQuery {
            addresses: self.addresses(),
            from_block,
            to_block,
        }
    }
}

impl FromIterator<(Address, Vec<B256>)> for LogFilter {
    fn from_iter<I: IntoIterator<Item = (Address, Vec<B256>)>>(iter: I) -> Self {
        let mut filter = LogFilter::new();
        for (address, topics) in iter {
            let entry = filter.events.entry(address).or_default();
            entry.extend(topics);
        }
        filter
    }
}

/// Inclusive block range restricted to a set of contract addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub addresses: Vec<Address>,
    pub from_block: u64,
    pub to_block: u64,
}

impl LogQuery {
    /// `eth_getLogs` filter object. Topics are filtered client-side.
    pub fn to_rpc_param(&self) -> Value {
        let addresses: Vec<String> = self.addresses.iter().map(|a| format!("{:#x}", a)).collect();
        json!({
            "address": addresses,
            "fromBlock": format!("0x{:x}", self.from_block),
            "toBlock": format!("0x{:x}", self.to_block),
        })
    }
}
