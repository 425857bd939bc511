//! Block and log source for the tracked chain.

use crate::error::TrackerError;
use crate::filter::LogQuery;
use crate::types::{decode_block_header, decode_log, BlockHeader, BlockNumber, Log};
use alloy::primitives::B256;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// JSON-RPC surface the tracker needs. Implementations must not retry on their own;
/// the supervisor owns retry and backoff.
#[async_trait]
pub trait BlockProvider: Send + Sync {
    async fn get_block_by_hash(&self, hash: B256) -> Result<Option<BlockHeader>, TrackerError>;

    async fn get_block_by_number(
        &self,
        number: BlockNumber,
    ) -> Result<Option<BlockHeader>, TrackerError>;

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<Log>, TrackerError>;
}

/// `eth_*` over HTTP POST.
pub struct HttpBlockProvider {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpBlockProvider {
    pub fn new(url: impl Into<String>) -> Result<Self, TrackerError> {
        let client = reqwest::Client::builder().no_proxy().build()?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, TrackerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        http_json_rpc(&self.client, &self.url, method, params, id).await
    }
}

async fn http_json_rpc(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Value,
    id: u64,
) -> Result<Value, TrackerError> {
    let body = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    });
    let resp = client.post(url).json(&body).send().await?;
    let resp = resp.error_for_status()?;
    let json: Value = resp.json().await?;
    if let Some(err) = json.get("error") {
        return Err(TrackerError::Rpc(format!("{}: {}", method, err)));
    }
    json.get("result")
        .cloned()
        .ok_or_else(|| TrackerError::Decode(format!("{}: missing result", method)))
}

fn decode_optional_block(result: &Value) -> Result<Option<BlockHeader>, TrackerError> {
    if result.is_null() {
        return Ok(None);
    }
    decode_block_header(result).map(Some)
}

#[async_trait]
impl BlockProvider for HttpBlockProvider {
    async fn get_block_by_hash(&self, hash: B256) -> Result<Option<BlockHeader>, TrackerError> {
        let result = self
            .call("eth_getBlockByHash", json!([format!("{:#x}", hash), false]))
            .await?;
        decode_optional_block(&result)
    }

    async fn get_block_by_number(
        &self,
        number: BlockNumber,
    ) -> Result<Option<BlockHeader>, TrackerError> {
        let result = self
            .call("eth_getBlockByNumber", json!([number.to_rpc_param(), false]))
            .await?;
        decode_optional_block(&result)
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<Log>, TrackerError> {
        let result = self.call("eth_getLogs", json!([query.to_rpc_param()])).await?;
        let arr = result
            .as_array()
            .ok_or_else(|| TrackerError::Decode("getLogs not array".into()))?;
        arr.iter().map(decode_log).collect()
    }
}
