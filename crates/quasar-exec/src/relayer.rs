//! Pluggable submission relayers (fee-sponsoring services).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stellar_xdr::curr::{HostFunction, Limits, SorobanAuthorizationEntry, WriteXdr};
use tracing::debug;

use crate::error::RpcError;

/// What a relayer is asked to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayRequest {
    /// Host function plus signed auth entries; the relayer builds and pays for the envelope
    HostFunction {
        func: HostFunction,
        auth: Vec<SorobanAuthorizationEntry>,
    },
    /// A fully signed envelope, base64 XDR
    SignedEnvelope(String),
}

impl RelayRequest {
    /// JSON body: `{"func": .., "auth": [..]}` or `{"xdr": ..}`.
    pub fn to_json(&self) -> Result<Value, RpcError> {
        let encode = |e: stellar_xdr::curr::Error| RpcError::Xdr(e.to_string());
        match self {
            RelayRequest::HostFunction { func, auth } => {
                let auth = auth
                    .iter()
                    .map(|entry| entry.to_xdr_base64(Limits::none()).map_err(encode))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(json!({
                    "func": func.to_xdr_base64(Limits::none()).map_err(encode)?,
                    "auth": auth,
                }))
            }
            RelayRequest::SignedEnvelope(xdr) => Ok(json!({ "xdr": xdr })),
        }
    }
}

/// Relayer answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayResponse {
    pub success: bool,
    pub hash: Option<String>,
    pub status: Option<String>,
    pub error: Option<String>,
    pub error_code: Option<String>,
}

/// Replaces `sendTransaction` when configured. Polling still uses the RPC.
#[async_trait]
pub trait Relayer: Send + Sync {
    async fn relay(&self, request: RelayRequest) -> Result<RelayResponse, RpcError>;
}

/// Relayer reached over HTTP with an optional bearer token.
#[derive(Debug, Clone)]
pub struct HttpRelayer {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpRelayer {
    pub fn new(url: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl Relayer for HttpRelayer {
    async fn relay(&self, request: RelayRequest) -> Result<RelayResponse, RpcError> {
        let body = request.to_json()?;
        debug!(url = %self.url, "relaying transaction");

        let mut builder = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| RpcError::Network(format!("reading relayer body: {}", e)))?;

        // Relayers report rejections in the body, often with a 4xx status.
        match serde_json::from_str::<RelayResponse>(&text) {
            Ok(parsed) => Ok(parsed),
            Err(_) if !status.is_success() => {
                Err(RpcError::Network(format!("HTTP {}: {}", status, text)))
            }
            Err(e) => Err(RpcError::InvalidResponse(format!("relayer JSON: {}", e))),
        }
    }
}
