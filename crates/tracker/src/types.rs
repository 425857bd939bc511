//! Chain records consumed by the tracker and their JSON-RPC decoding.
//!
//! Decodes `eth_getBlockBy*` results (header fields only) and `eth_getLogs` entries.

use crate::error::TrackerError;
use alloy::primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Block selector for `eth_getBlockByNumber`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockNumber {
    Latest,
    Number(u64),
}

impl BlockNumber {
    /// JSON-RPC parameter form: `"latest"` or a hex quantity.
    pub fn to_rpc_param(&self) -> Value {
        match self {
            BlockNumber::Latest => Value::String("latest".into()),
            BlockNumber::Number(n) => Value::String(format!("0x{:x}", n)),
        }
    }
}

impl From<u64> for BlockNumber {
    fn from(n: u64) -> Self {
        BlockNumber::Number(n)
    }
}

/// Header fields of an observed block. Contents are not validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: u64,
}

/// One event log from a finalized block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub block_hash: B256,
    pub transaction_hash: B256,
    pub log_index: u64,
}

/// Identity of a log on the canonical chain; stable across re-fetches of the same range.
pub type LogKey = (u64, B256, u64);

impl Log {
    /// Primary topic (event signature hash), if any.
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }

    pub fn key(&self) -> LogKey {
        (self.block_number, self.transaction_hash, self.log_index)
    }
}

/// Decode a JSON-RPC block object (header fields only; transactions are ignored).
pub fn decode_block_header(value: &Value) -> Result<BlockHeader, TrackerError> {
    Ok(BlockHeader {
        number: parse_hex_u64(field_str(value, "number")?)?,
        hash: parse_b256(field_str(value, "hash")?)?,
        parent_hash: parse_b256(field_str(value, "parentHash")?)?,
        timestamp: parse_hex_u64(field_str(value, "timestamp")?)?,
    })
}

/// Decode a JSON-RPC log (eth_getLogs result entry).
pub fn decode_log(value: &Value) -> Result<Log, TrackerError> {
    let address = Address::from_str(field_str(value, "address")?)
        .map_err(|e| TrackerError::Decode(format!("address: {}", e)))?;
    let topics = value
        .get("topics")
        .and_then(|t| t.as_array())
        .ok_or_else(|| TrackerError::Decode("Missing topics".into()))?
        .iter()
        .map(|t| {
            t.as_str()
                .ok_or_else(|| TrackerError::Decode("topic not string".into()))
                .and_then(parse_b256)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let data = Bytes::from_str(field_str(value, "data")?)
        .map_err(|e| TrackerError::Decode(format!("data: {}", e)))?;
    Ok(Log {
        address,
        topics,
        data,
        block_number: parse_hex_u64(field_str(value, "blockNumber")?)?,
        block_hash: parse_b256(field_str(value, "blockHash")?)?,
        transaction_hash: parse_b256(field_str(value, "transactionHash")?)?,
        log_index: parse_hex_u64(field_str(value, "logIndex")?)?,
    })
}

fn field_str<'a>(value: &'a Value, key: &str) -> Result<&'a str, TrackerError> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| TrackerError::Decode(format!("Missing {}", key)))
}

pub(crate) fn parse_hex_u64(s: &str) -> Result<u64, TrackerError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).map_err(|e| TrackerError::Decode(format!("hex u64 {:?}: {}", s, e)))
}

pub(crate) fn parse_b256(s: &str) -> Result<B256, TrackerError> {
    B256::from_str(s).map_err(|e| TrackerError::Decode(format!("32-byte hash {:?}: {}", s, e)))
}
