//! Error types for the invocation pipeline.

use std::time::Duration;

use quasar_compile::{SchemaError, XdrError};
use stellar_xdr::curr::ScVal;
use thiserror::Error;

use crate::assembler::{AssembledTransaction, AssemblyState};
use crate::types::TransactionStatus;

/// Errors raised by the RPC transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// Failed to reach the RPC endpoint, or it answered with a non-2xx status
    #[error("network error: {0}")]
    Network(String),
    /// RPC returned a JSON-RPC error object
    #[error("RPC error (code {code}): {message}")]
    Rpc { code: i64, message: String },
    /// Invalid or unexpected response shape
    #[error("invalid RPC response: {0}")]
    InvalidResponse(String),
    /// Source account not found on the network
    #[error("account not found: {0}")]
    AccountNotFound(String),
    /// A response field could not be decoded as XDR
    #[error("XDR error: {0}")]
    Xdr(String),
}

impl From<reqwest::Error> for RpcError {
    fn from(e: reqwest::Error) -> Self {
        RpcError::Network(e.to_string())
    }
}

/// Key decoding and signing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignError {
    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),
    #[error("signer {signer} cannot sign for {address}")]
    WrongSigner { signer: String, address: String },
    #[error("signing failed: {0}")]
    Failed(String),
}

/// The closed error taxonomy of the assembly pipeline.
#[derive(Debug, Error)]
pub enum ContractError {
    /// The invocation could not be marshalled
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Signing or sending attempted before a successful simulation
    #[error("transaction has not been simulated")]
    NotYetSimulated,

    /// The server rejected the dry run; the diagnostic is passed through verbatim
    #[error("simulation failed: {diagnostic}")]
    SimulationFailed {
        diagnostic: String,
        events: Vec<String>,
    },

    /// Simulation found archived state and no restoration was attempted
    #[error("archived ledger state must be restored first (restore fee {min_resource_fee} stroops)")]
    ExpiredState { min_resource_fee: u64 },

    /// The restore sub-transaction failed, timed out, or did not revive the state
    #[error("state restoration failed: {reason}")]
    RestorationFailure { reason: String },

    /// Read-only call: the simulated result is final, nothing to submit
    #[error("no signature needed: read-only call")]
    NoSignatureNeeded { result: Option<ScVal> },

    /// Some required addresses have not signed yet
    #[error("needs more signatures: missing {}", .missing.join(", "))]
    NeedsMoreSignatures { missing: Vec<String> },

    /// sendTransaction rejected the envelope at admission
    #[error("sendTransaction failed (status {status})")]
    SendTransactionFailed {
        status: String,
        hash: Option<String>,
        error_result_xdr: Option<String>,
        diagnostic_events: Vec<String>,
    },

    /// Poll timeout reached without a terminal ledger status
    #[error("transaction {hash} still pending after {}s (last status {last_status})", .elapsed.as_secs())]
    TransactionStillPending {
        hash: String,
        last_status: TransactionStatus,
        elapsed: Duration,
    },

    /// The ledger reports terminal failure after execution
    #[error("transaction {hash} failed on ledger")]
    TransactionFailed {
        hash: String,
        ledger: Option<u64>,
        result_xdr: Option<String>,
        diagnostic_events: Vec<String>,
    },

    /// The operation is not valid in the current lifecycle state
    #[error("cannot {operation} in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: AssemblyState,
    },

    #[error(transparent)]
    Transport(#[from] RpcError),

    #[error(transparent)]
    Signing(#[from] SignError),

    /// Envelope assembly or serialization error
    #[error("XDR error: {0}")]
    Xdr(String),
}

impl From<XdrError> for ContractError {
    fn from(e: XdrError) -> Self {
        ContractError::InvalidArgument(e.to_string())
    }
}

impl From<SchemaError> for ContractError {
    fn from(e: SchemaError) -> Self {
        ContractError::InvalidArgument(e.to_string())
    }
}

impl From<stellar_xdr::curr::Error> for ContractError {
    fn from(e: stellar_xdr::curr::Error) -> Self {
        ContractError::Xdr(e.to_string())
    }
}

/// A pipeline error together with the transaction it came from.
///
/// `transaction` is `None` only when the failure happened before a
/// transaction could be built (e.g. deploy argument validation).
#[derive(Debug, Error)]
#[error("{error}")]
pub struct InvokeFailure {
    #[source]
    pub error: ContractError,
    pub transaction: Option<Box<AssembledTransaction>>,
}

impl InvokeFailure {
    pub fn new(error: ContractError, transaction: AssembledTransaction) -> Self {
        Self {
            error,
            transaction: Some(Box::new(transaction)),
        }
    }

    pub fn detached(error: ContractError) -> Self {
        Self {
            error,
            transaction: None,
        }
    }
}
