//! Submission and status polling.

use std::sync::Arc;
use std::time::Duration;

use stellar_xdr::curr::{Limits, ReadXdr, ScVal, TransactionEnvelope, TransactionMeta};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::ClientOptions;
use crate::error::ContractError;
use crate::relayer::{RelayRequest, Relayer};
use crate::rpc::SorobanRpc;
use crate::transaction::envelope_to_base64;
use crate::types::{SubmissionOutcome, TransactionStatus};

/// Fixed-interval polling bounded by a wall-clock budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl From<&ClientOptions> for PollConfig {
    fn from(options: &ClientOptions) -> Self {
        Self {
            interval: options.poll_interval(),
            timeout: options.poll_timeout(),
        }
    }
}

/// A transaction the network accepted for inclusion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingHandle {
    pub hash: String,
}

/// Submits envelopes and polls `getTransaction` until a terminal status.
///
/// Dropping the `poll` future cancels polling; the transaction itself may
/// still land.
#[derive(Clone)]
pub struct SubmissionPoller {
    rpc: Arc<dyn SorobanRpc>,
    relayer: Option<Arc<dyn Relayer>>,
    config: PollConfig,
}

impl SubmissionPoller {
    pub fn new(rpc: Arc<dyn SorobanRpc>, config: PollConfig) -> Self {
        Self {
            rpc,
            relayer: None,
            config,
        }
    }

    pub fn with_relayer(mut self, relayer: Option<Arc<dyn Relayer>>) -> Self {
        self.relayer = relayer;
        self
    }

    /// Submit a signed envelope. Anything but `PENDING` is an admission failure.
    pub async fn send(&self, envelope: &TransactionEnvelope) -> Result<PendingHandle, ContractError> {
        let envelope_b64 = envelope_to_base64(envelope)?;
        if self.relayer.is_some() {
            return self.relay(RelayRequest::SignedEnvelope(envelope_b64)).await;
        }

        let response = self.rpc.send_transaction(&envelope_b64).await?;
        if !response.is_pending() {
            warn!(status = %response.status, hash = %response.hash, "sendTransaction rejected");
            return Err(ContractError::SendTransactionFailed {
                status: response.status,
                hash: Some(response.hash).filter(|h| !h.is_empty()),
                error_result_xdr: response.error_result_xdr,
                diagnostic_events: response.diagnostic_events_xdr,
            });
        }

        info!(hash = %response.hash, "transaction submitted");
        Ok(PendingHandle {
            hash: response.hash,
        })
    }

    /// Hand a request to the configured relayer.
    pub async fn relay(&self, request: RelayRequest) -> Result<PendingHandle, ContractError> {
        let relayer = self
            .relayer
            .as_ref()
            .ok_or_else(|| ContractError::InvalidArgument("no relayer configured".into()))?;

        let response = relayer.relay(request).await?;
        match response.hash {
            Some(hash) if response.success && !hash.is_empty() => {
                info!(%hash, "transaction relayed");
                Ok(PendingHandle { hash })
            }
            hash => {
                warn!(error = ?response.error, code = ?response.error_code, "relayer rejected transaction");
                Err(ContractError::SendTransactionFailed {
                    status: response
                        .status
                        .unwrap_or_else(|| "RELAYER_ERROR".to_string()),
                    hash,
                    error_result_xdr: None,
                    diagnostic_events: response
                        .error
                        .into_iter()
                        .chain(response.error_code)
                        .collect(),
                })
            }
        }
    }

    /// Poll until `SUCCESS`/`FAILED` or the timeout elapses.
    ///
    /// `NOT_FOUND` and `PENDING` keep polling. A timeout yields
    /// `SubmissionOutcome::StillPending`, never an error.
    pub async fn poll(&self, handle: &PendingHandle) -> Result<SubmissionOutcome, ContractError> {
        let started = Instant::now();
        let deadline = started + self.config.timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let response = self.rpc.get_transaction(&handle.hash).await?;

            match response.status {
                TransactionStatus::Success => {
                    info!(hash = %handle.hash, ledger = ?response.ledger, attempts, "transaction succeeded");
                    let return_value = response
                        .result_meta_xdr
                        .as_deref()
                        .and_then(decode_return_value);
                    return Ok(SubmissionOutcome::Success {
                        hash: handle.hash.clone(),
                        ledger: response.ledger,
                        return_value,
                        result_meta_xdr: response.result_meta_xdr,
                    });
                }
                TransactionStatus::Failed => {
                    warn!(hash = %handle.hash, ledger = ?response.ledger, "transaction failed");
                    return Ok(SubmissionOutcome::Failed {
                        hash: handle.hash.clone(),
                        ledger: response.ledger,
                        result_xdr: response.result_xdr,
                        diagnostic_events: response.diagnostic_events_xdr,
                    });
                }
                status => {
                    let now = Instant::now();
                    if now >= deadline {
                        warn!(hash = %handle.hash, %status, attempts, "poll timeout reached");
                        return Ok(SubmissionOutcome::StillPending {
                            hash: handle.hash.clone(),
                            last_status: status,
                            elapsed: now - started,
                        });
                    }
                    debug!(hash = %handle.hash, %status, attempts, "transaction not final yet");
                    sleep(self.config.interval.min(deadline - now)).await;
                }
            }
        }
    }
}

/// Return value from `TransactionMeta` v3 or v4.
pub(crate) fn decode_return_value(meta_b64: &str) -> Option<ScVal> {
    match TransactionMeta::from_xdr_base64(meta_b64, Limits::none()).ok()? {
        TransactionMeta::V3(v3) => v3.soroban_meta.map(|meta| meta.return_value),
        TransactionMeta::V4(v4) => v4.soroban_meta.and_then(|meta| meta.return_value),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
