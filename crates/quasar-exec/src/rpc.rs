//! JSON-RPC transport for Soroban RPC endpoints.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::RpcError;
use crate::types::{AccountInfo, TransactionStatus};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-RPC code stellar-rpc uses for a missing account.
const ACCOUNT_NOT_FOUND_CODE: i64 = -32600;

/// Admission result of `sendTransaction`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTransactionResponse {
    #[serde(default)]
    pub hash: String,
    /// `PENDING`, `DUPLICATE`, `TRY_AGAIN_LATER` or `ERROR`
    pub status: String,
    #[serde(default)]
    pub error_result_xdr: Option<String>,
    #[serde(default)]
    pub diagnostic_events_xdr: Vec<String>,
}

impl SendTransactionResponse {
    pub fn is_pending(&self) -> bool {
        self.status == "PENDING"
    }
}

/// Ledger view of a submitted transaction from `getTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetTransactionResponse {
    pub status: TransactionStatus,
    pub ledger: Option<u64>,
    pub result_xdr: Option<String>,
    pub result_meta_xdr: Option<String>,
    pub envelope_xdr: Option<String>,
    pub diagnostic_events_xdr: Vec<String>,
}

/// The RPC surface the assembly pipeline depends on.
#[async_trait]
pub trait SorobanRpc: Send + Sync {
    async fn get_account(&self, account_id: &str) -> Result<AccountInfo, RpcError>;

    /// Dry-run an envelope; returns the raw `result` object.
    async fn simulate_transaction(&self, tx_xdr_base64: &str) -> Result<Value, RpcError>;

    async fn send_transaction(&self, tx_xdr_base64: &str)
        -> Result<SendTransactionResponse, RpcError>;

    async fn get_transaction(&self, hash: &str) -> Result<GetTransactionResponse, RpcError>;

    /// Look up ledger entries by base64 XDR `LedgerKey`s; returns the raw `result` object.
    async fn get_ledger_entries(&self, keys: &[String]) -> Result<Value, RpcError>;
}

#[derive(Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct Response<T> {
    result: Option<T>,
    error: Option<ErrorObject>,
}

#[derive(Deserialize)]
struct ErrorObject {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl<T> Response<T> {
    fn into_result(self) -> Result<T, RpcError> {
        if let Some(error) = self.error {
            return Err(RpcError::Rpc {
                code: error.code,
                message: if error.message.is_empty() {
                    "unknown error".to_string()
                } else {
                    error.message
                },
            });
        }
        self.result
            .ok_or_else(|| RpcError::InvalidResponse("missing 'result' field".to_string()))
    }
}

#[derive(Deserialize)]
struct AccountResult {
    id: Option<String>,
    sequence: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionResultWire {
    status: String,
    #[serde(default)]
    ledger: Option<NumberOrString>,
    result_xdr: Option<String>,
    result_meta_xdr: Option<String>,
    envelope_xdr: Option<String>,
    #[serde(default)]
    diagnostic_events_xdr: Vec<String>,
}

/// stellar-rpc encodes some integers as strings depending on the version.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    Text(String),
}

impl NumberOrString {
    fn value(&self) -> Option<u64> {
        match self {
            NumberOrString::Number(n) => Some(*n),
            NumberOrString::Text(s) => s.parse().ok(),
        }
    }
}

/// Soroban RPC over HTTP. Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    pub fn new(url: &str) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(RpcClient {
            client,
            url: url.to_string(),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let request = Request {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!(method, id = request.id, url = %self.url, "rpc request");

        let resp = self.client.post(&self.url).json(&request).send().await?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| RpcError::Network(format!("reading response body: {}", e)))?;
        if !status.is_success() {
            return Err(RpcError::Network(format!("HTTP {}: {}", status, text)));
        }

        decode_response(&text)
    }
}

#[async_trait]
impl SorobanRpc for RpcClient {
    async fn get_account(&self, account_id: &str) -> Result<AccountInfo, RpcError> {
        let result = self
            .call::<AccountResult>("getAccount", json!({ "address": account_id }))
            .await;
        account_info(result, account_id)
    }

    async fn simulate_transaction(&self, tx_xdr_base64: &str) -> Result<Value, RpcError> {
        self.call("simulateTransaction", json!({ "transaction": tx_xdr_base64 }))
            .await
    }

    async fn send_transaction(
        &self,
        tx_xdr_base64: &str,
    ) -> Result<SendTransactionResponse, RpcError> {
        self.call("sendTransaction", json!({ "transaction": tx_xdr_base64 }))
            .await
    }

    async fn get_transaction(&self, hash: &str) -> Result<GetTransactionResponse, RpcError> {
        let wire: TransactionResultWire = self.call("getTransaction", json!({ "hash": hash })).await?;
        Ok(wire.into())
    }

    async fn get_ledger_entries(&self, keys: &[String]) -> Result<Value, RpcError> {
        self.call("getLedgerEntries", json!({ "keys": keys })).await
    }
}

fn decode_response<T: DeserializeOwned>(body: &str) -> Result<T, RpcError> {
    serde_json::from_str::<Response<T>>(body)
        .map_err(|e| RpcError::InvalidResponse(format!("invalid JSON-RPC body: {}", e)))?
        .into_result()
}

fn account_info(
    result: Result<AccountResult, RpcError>,
    account_id: &str,
) -> Result<AccountInfo, RpcError> {
    let account = match result {
        Ok(account) => account,
        Err(RpcError::Rpc { code, message })
            if code == ACCOUNT_NOT_FOUND_CODE || message.contains("not found") =>
        {
            return Err(RpcError::AccountNotFound(account_id.to_string()));
        }
        Err(e) => return Err(e),
    };

    let sequence = account.sequence.parse::<i64>().map_err(|_| {
        RpcError::InvalidResponse(format!("invalid sequence '{}'", account.sequence))
    })?;
    Ok(AccountInfo {
        account_id: account.id.unwrap_or_else(|| account_id.to_string()),
        sequence,
    })
}

impl From<TransactionResultWire> for GetTransactionResponse {
    fn from(wire: TransactionResultWire) -> Self {
        Self {
            status: TransactionStatus::parse(&wire.status),
            ledger: wire.ledger.as_ref().and_then(NumberOrString::value),
            result_xdr: wire.result_xdr,
            result_meta_xdr: wire.result_meta_xdr,
            envelope_xdr: wire.envelope_xdr,
            diagnostic_events_xdr: wire.diagnostic_events_xdr,
        }
    }
}

/// Integer field that may be a JSON number or a decimal string.
pub(crate) fn number_field(value: &Value, key: &str) -> Option<u64> {
    let field = value.get(key)?;
    field
        .as_u64()
        .or_else(|| field.as_str().and_then(|s| s.parse().ok()))
}

/// String array field; missing or mistyped means empty.
pub(crate) fn string_list(value: &Value, key: &str) -> Vec<String> {
    let Some(items) = value.get(key).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
