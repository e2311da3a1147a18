//! Read access to the chain through an Ethereum JSON-RPC node.

use alloy_primitives::{Address, B256, hex};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("response parsing error: {0}")]
    Parse(String),
}

/// An event log as returned by `eth_getTransactionReceipt` and `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub block_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    /// `0x1` on success, `0x0` when reverted.
    #[serde(default)]
    pub status: Option<String>,
    /// `None` for contract creations.
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("0x1"))
    }
}

/// Block-range query of one contract's logs with one topic0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub topic0: B256,
    pub from_block: u64,
    pub to_block: u64,
}

#[async_trait::async_trait]
pub trait LedgerClient: Send + Sync {
    /// `None` when the node does not know the transaction (yet).
    async fn transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TransactionReceipt>, LedgerError>;

    async fn block_number(&self) -> Result<u64, LedgerError>;

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, LedgerError>;
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

const RPC_TIMEOUT: Duration = Duration::from_secs(15);

/// [`LedgerClient`] over HTTP JSON-RPC.
#[derive(Debug)]
pub struct JsonRpcLedger {
    http_client: reqwest::Client,
    rpc_url: Url,
    next_id: AtomicU64,
}

impl JsonRpcLedger {
    pub fn new(rpc_url: Url) -> Result<Self, LedgerError> {
        let http_client = reqwest::Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()?;
        Ok(Self {
            http_client,
            rpc_url,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>, LedgerError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let response = self
            .http_client
            .post(self.rpc_url.clone())
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let body: RpcResponse<T> = response.json().await?;
        if let Some(error) = body.error {
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(body.result)
    }
}

#[async_trait::async_trait]
impl LedgerClient for JsonRpcLedger {
    #[tracing::instrument(skip(self), err, name = "RPC:eth_getTransactionReceipt")]
    async fn transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TransactionReceipt>, LedgerError> {
        self.call("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
            .await
    }

    #[tracing::instrument(skip(self), err, name = "RPC:eth_blockNumber")]
    async fn block_number(&self) -> Result<u64, LedgerError> {
        let hex: String = self
            .call("eth_blockNumber", serde_json::json!([]))
            .await?
            .ok_or_else(|| LedgerError::Parse("empty eth_blockNumber result".into()))?;
        parse_quantity(&hex)
    }

    #[tracing::instrument(skip(self), err, name = "RPC:eth_getLogs")]
    async fn logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, LedgerError> {
        let params = serde_json::json!([{
            "address": hex::encode_prefixed(filter.address),
            "topics": [hex::encode_prefixed(filter.topic0)],
            "fromBlock": format!("0x{:x}", filter.from_block),
            "toBlock": format!("0x{:x}", filter.to_block),
        }]);
        Ok(self.call("eth_getLogs", params).await?.unwrap_or_default())
    }
}

/// Parse a JSON-RPC hex quantity such as `0x1b4`.
pub fn parse_quantity(hex: &str) -> Result<u64, LedgerError> {
    let body = hex
        .strip_prefix("0x")
        .ok_or_else(|| LedgerError::Parse(format!("not a hex quantity: {hex}")))?;
    u64::from_str_radix(body, 16).map_err(|e| LedgerError::Parse(format!("{hex}: {e}")))
}
