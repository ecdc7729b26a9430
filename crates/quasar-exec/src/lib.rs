//! Soroban contract invocation pipeline.
//!
//! A [`ContractClient`] turns a contract call or a deployment into an
//! [`AssembledTransaction`], which is simulated, restored if ledger state
//! expired, signed by every required party, submitted and polled until the
//! ledger reports a final status.

pub mod assembler;
pub mod client;
pub mod config;
pub mod deploy;
pub mod error;
pub mod poller;
pub mod relayer;
pub mod rpc;
pub mod sign;
pub mod signers;
pub mod simulator;
pub mod transaction;
pub mod types;

#[cfg(test)]
mod testing;

pub use assembler::{AssembledTransaction, AssemblyContext, AssemblyState, Invocation};
pub use client::{ContractClient, InvokeResult};
pub use config::{ClientOptions, ConfigError, Network};
pub use deploy::{contract_id, DeployRequest, DeployResult};
pub use error::{ContractError, InvokeFailure, RpcError, SignError};
pub use poller::{PendingHandle, PollConfig, SubmissionPoller};
pub use relayer::{HttpRelayer, RelayRequest, RelayResponse, Relayer};
pub use rpc::{RpcClient, SorobanRpc};
pub use sign::{Keypair, TransactionSigner};
pub use signers::{SignatureSet, SignerRequirement, SignerResolver};
pub use simulator::{format_summary, SimulationCoordinator};
pub use types::{
    AccountInfo, CostBreakdown, SimulationOutcome, SimulationResult, SubmissionOutcome,
    TransactionResult, TransactionStatus,
};
