//! Data types shared by simulation, submission and polling.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use stellar_xdr::curr::{
    ScVal, SorobanAuthorizationEntry, SorobanResources, SorobanTransactionData,
};

/// Account information from the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountInfo {
    /// Account ID (G... address)
    pub account_id: String,
    /// Current sequence number
    pub sequence: i64,
}

/// CPU and memory cost breakdown from simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CostBreakdown {
    /// CPU instructions consumed
    pub cpu_instructions: u64,
    /// Memory bytes consumed
    pub memory_bytes: u64,
}

/// Restoration the server says must land before the call can succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestorePreamble {
    /// Footprint and resources for the `RestoreFootprint` transaction
    pub transaction_data: SorobanTransactionData,
    /// Resource fee for the restore transaction, in stroops
    pub min_resource_fee: u64,
}

/// A successful dry run, decoded from the `simulateTransaction` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationResult {
    pub transaction_data: SorobanTransactionData,
    pub min_resource_fee: u64,
    pub cost: CostBreakdown,
    /// Authorization entries the invocation requires, unsigned
    pub auth: Vec<SorobanAuthorizationEntry>,
    /// Value the call would return
    pub return_value: Option<ScVal>,
    /// Diagnostic events, base64 XDR
    pub events: Vec<String>,
    pub latest_ledger: u32,
    pub restore_preamble: Option<RestorePreamble>,
}

impl SimulationResult {
    pub fn resources(&self) -> &SorobanResources {
        &self.transaction_data.resources
    }

    /// A call with no authorizations and nothing in the read-write footprint
    /// changes no ledger state.
    pub fn is_read_call(&self) -> bool {
        self.auth.is_empty() && self.resources().footprint.read_write.is_empty()
    }
}

/// What the pipeline should do after a dry run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Restore,
    Sign,
    Fail,
}

/// Result of `simulateTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationOutcome {
    Success(Box<SimulationResult>),
    Failed { error: String, events: Vec<String> },
}

impl SimulationOutcome {
    pub fn next_step(&self) -> NextStep {
        match self {
            SimulationOutcome::Failed { .. } => NextStep::Fail,
            SimulationOutcome::Success(result) if result.restore_preamble.is_some() => {
                NextStep::Restore
            }
            SimulationOutcome::Success(_) => NextStep::Sign,
        }
    }
}

/// Ledger status reported by `getTransaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransactionStatus {
    NotFound,
    Pending,
    Success,
    Failed,
    Unknown(String),
}

impl TransactionStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "NOT_FOUND" => TransactionStatus::NotFound,
            "PENDING" => TransactionStatus::Pending,
            "SUCCESS" => TransactionStatus::Success,
            "FAILED" => TransactionStatus::Failed,
            other => TransactionStatus::Unknown(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Success | TransactionStatus::Failed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::NotFound => write!(f, "NOT_FOUND"),
            TransactionStatus::Pending => write!(f, "PENDING"),
            TransactionStatus::Success => write!(f, "SUCCESS"),
            TransactionStatus::Failed => write!(f, "FAILED"),
            TransactionStatus::Unknown(s) => write!(f, "{}", s),
        }
    }
}

/// Terminal (or timed-out) result of polling a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Success {
        hash: String,
        ledger: Option<u64>,
        return_value: Option<ScVal>,
        result_meta_xdr: Option<String>,
    },
    Failed {
        hash: String,
        ledger: Option<u64>,
        result_xdr: Option<String>,
        diagnostic_events: Vec<String>,
    },
    StillPending {
        hash: String,
        last_status: TransactionStatus,
        elapsed: Duration,
    },
}

/// A transaction the ledger applied successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResult {
    pub hash: String,
    pub ledger: Option<u64>,
    pub return_value: Option<ScVal>,
}

impl SubmissionOutcome {
    pub fn hash(&self) -> &str {
        match self {
            SubmissionOutcome::Success { hash, .. }
            | SubmissionOutcome::Failed { hash, .. }
            | SubmissionOutcome::StillPending { hash, .. } => hash,
        }
    }
}
