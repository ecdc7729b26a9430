//! The transaction assembly state machine:
//! build -> simulate -> [restore] -> sign -> send -> poll.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use stellar_xdr::curr::{
    ContractExecutable, ContractIdPreimage, ContractIdPreimageFromAddress, CreateContractArgsV2,
    Hash, HostFunction, InvokeContractArgs, ScAddress, ScVal, TransactionEnvelope, Uint256,
};
use tracing::{debug, info, warn};

use quasar_compile::{decode_address, to_scvals, to_symbol, IrValue};

use crate::config::{ClientOptions, Network};
use crate::error::ContractError;
use crate::poller::{PendingHandle, PollConfig, SubmissionPoller};
use crate::relayer::{RelayRequest, Relayer};
use crate::rpc::SorobanRpc;
use crate::sign::{
    auth_entry_address, auth_entry_is_signed, decorated_signature, sign_auth_entry,
    TransactionSigner,
};
use crate::signers::{SignatureSet, SignerRequirement, SignerResolver};
use crate::simulator::SimulationCoordinator;
use crate::transaction::{
    assemble_transaction, auth_entries, build_transaction, host_function, invoke_operation,
    replace_auth_entries, restore_operation, transaction_hash, with_signatures,
};
use crate::types::{
    AccountInfo, RestorePreamble, SimulationOutcome, SimulationResult, SubmissionOutcome,
    TransactionResult,
};

/// Where an `AssembledTransaction` is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    Built,
    SimulationFailed,
    NeedsRestoration,
    Signable,
    NeedsMoreSignatures,
    Signed,
    Sent,
    StillPending,
    Success,
    Failed,
}

impl AssemblyState {
    /// The envelope has reached the network; it can no longer be changed.
    pub fn is_submitted(self) -> bool {
        matches!(
            self,
            AssemblyState::Sent
                | AssemblyState::StillPending
                | AssemblyState::Success
                | AssemblyState::Failed
        )
    }
}

/// The host function a transaction carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Call `function` on `contract` with native arguments
    Call {
        contract: String,
        function: String,
        args: Vec<IrValue>,
    },
    /// Install contract code
    UploadWasm { wasm: Vec<u8> },
    /// Instantiate installed code, running its constructor
    CreateContract {
        deployer: String,
        wasm_hash: [u8; 32],
        salt: [u8; 32],
        constructor_args: Vec<ScVal>,
    },
}

impl Invocation {
    pub fn call(contract: &str, function: &str, args: Vec<IrValue>) -> Self {
        Invocation::Call {
            contract: contract.to_string(),
            function: function.to_string(),
            args,
        }
    }

    /// Marshal into an XDR host function.
    pub fn host_function(&self) -> Result<HostFunction, ContractError> {
        let too_long = |what: &str| {
            let what = what.to_string();
            move |e: stellar_xdr::curr::Error| {
                ContractError::InvalidArgument(format!("{}: {}", what, e))
            }
        };

        match self {
            Invocation::Call {
                contract,
                function,
                args,
            } => {
                let contract_address = decode_address(contract)?;
                if !matches!(contract_address, ScAddress::Contract(_)) {
                    return Err(ContractError::InvalidArgument(format!(
                        "{} is not a contract address",
                        contract
                    )));
                }
                Ok(HostFunction::InvokeContract(InvokeContractArgs {
                    contract_address,
                    function_name: to_symbol(function)?,
                    args: to_scvals(args)?
                        .try_into()
                        .map_err(too_long("arguments"))?,
                }))
            }
            Invocation::UploadWasm { wasm } => {
                if wasm.is_empty() {
                    return Err(ContractError::InvalidArgument("empty WASM".into()));
                }
                Ok(HostFunction::UploadContractWasm(
                    wasm.clone().try_into().map_err(too_long("wasm"))?,
                ))
            }
            Invocation::CreateContract {
                deployer,
                wasm_hash,
                salt,
                constructor_args,
            } => Ok(HostFunction::CreateContractV2(CreateContractArgsV2 {
                contract_id_preimage: ContractIdPreimage::Address(ContractIdPreimageFromAddress {
                    address: decode_address(deployer)?,
                    salt: Uint256(*salt),
                }),
                executable: ContractExecutable::Wasm(Hash(*wasm_hash)),
                constructor_args: constructor_args
                    .clone()
                    .try_into()
                    .map_err(too_long("constructor arguments"))?,
            })),
        }
    }

    /// Short description for logs.
    pub fn label(&self) -> String {
        match self {
            Invocation::Call {
                contract, function, ..
            } => format!("{}.{}", contract, function),
            Invocation::UploadWasm { wasm } => format!("upload_wasm({} bytes)", wasm.len()),
            Invocation::CreateContract { .. } => "create_contract".to_string(),
        }
    }
}

/// Shared collaborators of every transaction a client assembles.
#[derive(Clone)]
pub struct AssemblyContext {
    pub rpc: Arc<dyn SorobanRpc>,
    pub network: Network,
    pub options: ClientOptions,
    pub relayer: Option<Arc<dyn Relayer>>,
}

impl AssemblyContext {
    pub fn new(rpc: Arc<dyn SorobanRpc>, network: Network) -> Self {
        Self {
            rpc,
            network,
            options: ClientOptions::default(),
            relayer: None,
        }
    }

    fn poller(&self) -> SubmissionPoller {
        SubmissionPoller::new(self.rpc.clone(), PollConfig::from(&self.options))
            .with_relayer(self.relayer.clone())
    }
}

/// One contract invocation moving through
/// build -> simulate -> [restore] -> sign -> send -> poll.
///
/// Every method takes `&mut self`, so on error the caller still owns the
/// transaction and can inspect it, fix it and retry.
pub struct AssembledTransaction {
    context: AssemblyContext,
    invocation: Invocation,
    source: AccountInfo,
    source_signer: Option<Arc<dyn TransactionSigner>>,
    expected: BTreeSet<String>,
    /// Unsigned, unsimulated envelope
    built: TransactionEnvelope,
    /// Assembled envelope including signed auth entries, without envelope signatures
    envelope: TransactionEnvelope,
    /// Hash of the assembled envelope before any auth entry was signed
    assembled_hash: Option<[u8; 32]>,
    simulation: Option<SimulationResult>,
    signatures: SignatureSet,
    state: AssemblyState,
    submitted_hash: Option<String>,
    outcome: Option<SubmissionOutcome>,
}

impl fmt::Debug for AssembledTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssembledTransaction")
            .field("invocation", &self.invocation.label())
            .field("source", &self.source)
            .field("state", &self.state)
            .field("hash", &self.submitted_hash)
            .finish()
    }
}

impl AssembledTransaction {
    /// Build the unsigned envelope at `source.sequence + 1`. No network access.
    pub fn build(
        context: AssemblyContext,
        invocation: Invocation,
        source: AccountInfo,
    ) -> Result<Self, ContractError> {
        let built = build_envelope(&context.options, &invocation, &source)?;
        debug!(
            invocation = %invocation.label(),
            source = %source.account_id,
            sequence = source.sequence + 1,
            "transaction built"
        );

        Ok(Self {
            context,
            invocation,
            source,
            source_signer: None,
            expected: BTreeSet::new(),
            envelope: built.clone(),
            built,
            assembled_hash: None,
            simulation: None,
            signatures: SignatureSet::default(),
            state: AssemblyState::Built,
            submitted_hash: None,
            outcome: None,
        })
    }

    /// Signer for the source account. It completes the envelope signature once
    /// all auth entries are signed and signs restore transactions.
    pub fn with_source_signer(mut self, signer: Arc<dyn TransactionSigner>) -> Self {
        self.source_signer = Some(signer);
        self
    }

    /// Extra addresses that must sign the envelope.
    pub fn with_expected_signers<I>(mut self, signers: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.expected.extend(signers);
        self
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    pub fn source(&self) -> &AccountInfo {
        &self.source
    }

    pub fn simulation(&self) -> Option<&SimulationResult> {
        self.simulation.as_ref()
    }

    /// Return value predicted by the last simulation.
    pub fn simulated_value(&self) -> Option<&ScVal> {
        self.simulation.as_ref().and_then(|s| s.return_value.as_ref())
    }

    /// Hash returned by the network at submission.
    pub fn hash(&self) -> Option<&str> {
        self.submitted_hash.as_deref()
    }

    pub fn outcome(&self) -> Option<&SubmissionOutcome> {
        self.outcome.as_ref()
    }

    /// Current envelope with signed auth entries, without envelope signatures.
    pub fn envelope(&self) -> &TransactionEnvelope {
        &self.envelope
    }

    /// Current envelope with every envelope signature collected so far.
    pub fn signed_envelope(&self) -> Result<TransactionEnvelope, ContractError> {
        with_signatures(self.envelope.clone(), self.signatures.envelope_signatures())
    }

    /// Hex transaction hash of the current envelope.
    pub fn tx_hash(&self) -> Result<String, ContractError> {
        Ok(hex::encode(transaction_hash(
            &self.envelope,
            &self.context.network.passphrase,
        )?))
    }

    /// Required signers, known once simulation succeeded.
    pub fn requirement(&self) -> Option<SignerRequirement> {
        self.simulation.as_ref().map(|simulation| {
            SignerResolver::requirement(&self.source.account_id, &self.expected, &simulation.auth)
        })
    }

    pub fn missing_signers(&self) -> Vec<String> {
        match self.requirement() {
            Some(requirement) => self.signatures.missing(&requirement),
            None => Vec::new(),
        }
    }

    /// Missing signers the caller must supply; the held source signer signs on its own.
    fn outstanding(&self) -> Vec<String> {
        let missing = self.missing_signers();
        let Some(held) = self.source_signer.as_ref().map(|s| s.address()) else {
            return missing;
        };
        let others: Vec<String> = missing.iter().filter(|a| **a != held).cloned().collect();
        if others.is_empty() {
            missing
        } else {
            others
        }
    }

    /// Replace the invocation. Drops simulation and signatures.
    pub fn set_invocation(&mut self, invocation: Invocation) -> Result<(), ContractError> {
        self.ensure_unsubmitted("set_invocation")?;
        let built = build_envelope(&self.context.options, &invocation, &self.source)?;
        self.invocation = invocation;
        self.reset(built);
        Ok(())
    }

    /// Change the inclusion fee. Drops simulation and signatures.
    pub fn set_base_fee(&mut self, base_fee: u32) -> Result<(), ContractError> {
        self.ensure_unsubmitted("set_base_fee")?;
        let mut options = self.context.options.clone();
        options.base_fee = base_fee;
        let built = build_envelope(&options, &self.invocation, &self.source)?;
        self.context.options = options;
        self.reset(built);
        Ok(())
    }

    fn ensure_unsubmitted(&self, operation: &'static str) -> Result<(), ContractError> {
        if self.state.is_submitted() {
            return Err(ContractError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn reset(&mut self, built: TransactionEnvelope) {
        if !self.signatures.is_empty() {
            debug!("transaction rebuilt; dropping collected signatures");
        }
        self.envelope = built.clone();
        self.built = built;
        self.assembled_hash = None;
        self.simulation = None;
        self.signatures.clear();
        self.state = AssemblyState::Built;
    }

    /// Dry-run the built envelope and assemble the result into it.
    ///
    /// Resimulating is allowed until submission. Signatures survive only if
    /// the assembled transaction comes out identical.
    pub async fn simulate(&mut self) -> Result<AssemblyState, ContractError> {
        self.ensure_unsubmitted("simulate")?;

        let outcome = SimulationCoordinator::new(self.context.rpc.clone())
            .simulate(&self.built)
            .await?;

        let result = match outcome {
            SimulationOutcome::Failed { error, events } => {
                let built = self.built.clone();
                self.reset(built);
                self.state = AssemblyState::SimulationFailed;
                return Err(ContractError::SimulationFailed {
                    diagnostic: error,
                    events,
                });
            }
            SimulationOutcome::Success(result) => *result,
        };

        let assembled = assemble_transaction(
            self.built.clone(),
            &result.transaction_data,
            &result.auth,
            result.min_resource_fee,
            self.context.options.base_fee,
        )?;
        let assembled_hash = transaction_hash(&assembled, &self.context.network.passphrase)?;
        if self.assembled_hash != Some(assembled_hash) {
            if !self.signatures.is_empty() {
                debug!("simulation changed the transaction; dropping collected signatures");
            }
            self.signatures.clear();
            self.envelope = assembled;
            self.assembled_hash = Some(assembled_hash);
        }

        let needs_restore = result.restore_preamble.is_some();
        self.simulation = Some(result);
        self.state = if needs_restore {
            AssemblyState::NeedsRestoration
        } else if self.signatures.is_empty() {
            AssemblyState::Signable
        } else if self.missing_signers().is_empty() {
            AssemblyState::Signed
        } else {
            AssemblyState::NeedsMoreSignatures
        };
        Ok(self.state)
    }

    fn restore_preamble(&self) -> Option<&RestorePreamble> {
        self.simulation
            .as_ref()
            .and_then(|s| s.restore_preamble.as_ref())
    }

    fn require_simulated(&self, operation: &'static str) -> Result<&SimulationResult, ContractError> {
        match self.state {
            AssemblyState::Built | AssemblyState::SimulationFailed => {
                Err(ContractError::NotYetSimulated)
            }
            AssemblyState::NeedsRestoration => Err(ContractError::ExpiredState {
                min_resource_fee: self
                    .restore_preamble()
                    .map(|p| p.min_resource_fee)
                    .unwrap_or(0),
            }),
            AssemblyState::Signable | AssemblyState::NeedsMoreSignatures | AssemblyState::Signed => {
                self.simulation.as_ref().ok_or(ContractError::NotYetSimulated)
            }
            state => Err(ContractError::InvalidState { operation, state }),
        }
    }

    /// Submit the restore preamble, wait for it, then rebuild at the next
    /// sequence number and simulate again.
    ///
    /// Runs once: archived state after the restore is a `RestorationFailure`.
    pub async fn restore_and_retry(&mut self) -> Result<AssemblyState, ContractError> {
        if self.state != AssemblyState::NeedsRestoration {
            return Err(ContractError::InvalidState {
                operation: "restore",
                state: self.state,
            });
        }
        let preamble = self
            .restore_preamble()
            .cloned()
            .ok_or(ContractError::NotYetSimulated)?;
        let signer = self
            .source_signer
            .clone()
            .ok_or_else(|| ContractError::RestorationFailure {
                reason: "no source signer to sign the restore transaction".to_string(),
            })?;
        if signer.address() != self.source.account_id {
            return Err(ContractError::RestorationFailure {
                reason: format!(
                    "source signer {} does not match source account {}",
                    signer.address(),
                    self.source.account_id
                ),
            });
        }

        info!(
            fee = preamble.min_resource_fee,
            source = %self.source.account_id,
            "restoring archived ledger state"
        );
        let outcome = self
            .submit_restore(&preamble, signer.as_ref())
            .await
            .map_err(|e| ContractError::RestorationFailure {
                reason: e.to_string(),
            })?;
        match outcome {
            SubmissionOutcome::Success { hash, .. } => {
                info!(%hash, "ledger state restored");
                self.source.sequence += 1;
            }
            SubmissionOutcome::Failed { hash, .. } => {
                // Included in a ledger, so the sequence number is spent.
                self.source.sequence += 1;
                self.built = build_envelope(&self.context.options, &self.invocation, &self.source)?;
                self.assembled_hash = None;
                warn!(%hash, "restore transaction failed");
                return Err(ContractError::RestorationFailure {
                    reason: format!("restore transaction {} failed", hash),
                });
            }
            SubmissionOutcome::StillPending { hash, elapsed, .. } => {
                return Err(ContractError::RestorationFailure {
                    reason: format!(
                        "restore transaction {} still pending after {}s",
                        hash,
                        elapsed.as_secs()
                    ),
                });
            }
        }

        let built = build_envelope(&self.context.options, &self.invocation, &self.source)?;
        self.reset(built);

        match self.simulate().await? {
            AssemblyState::NeedsRestoration => {
                warn!("ledger state still archived after restoration");
                Err(ContractError::RestorationFailure {
                    reason: "ledger state still archived after restoration".to_string(),
                })
            }
            state => Ok(state),
        }
    }

    async fn submit_restore(
        &self,
        preamble: &RestorePreamble,
        signer: &dyn TransactionSigner,
    ) -> Result<SubmissionOutcome, ContractError> {
        let options = &self.context.options;
        let envelope = build_transaction(
            &self.source.account_id,
            self.source.sequence + 1,
            options.base_fee,
            options.timeout_seconds,
            restore_operation(),
        )?;
        let envelope = assemble_transaction(
            envelope,
            &preamble.transaction_data,
            &[],
            preamble.min_resource_fee,
            options.base_fee,
        )?;
        let tx_hash = transaction_hash(&envelope, &self.context.network.passphrase)?;
        let envelope = with_signatures(envelope, vec![decorated_signature(signer, &tx_hash)?])?;

        let poller = self.context.poller();
        let handle = poller.send(&envelope).await?;
        Ok(poller.poll(&handle).await?)
    }


    /// Add signatures from whichever of `signers` the transaction requires.
    ///
    /// Auth entries are signed first; envelope signatures (including the held
    /// source signer's) are added once every auth entry is signed, because
    /// signing an auth entry changes the transaction hash. Signing twice with
    /// the same signer changes nothing.
    ///
    /// A read-only call with no matching signer fails with
    /// `NoSignatureNeeded` carrying the simulated result.
    pub fn sign(&mut self, signers: &[&dyn TransactionSigner]) -> Result<AssemblyState, ContractError> {
        let simulation = self.require_simulated("sign")?;
        let read_call = simulation.is_read_call();
        let simulated_value = simulation.return_value.clone();
        let expiration = simulation
            .latest_ledger
            .saturating_add(self.context.options.auth_validity_ledgers);
        let requirement = self.requirement().ok_or(ContractError::NotYetSimulated)?;

        let matched: Vec<&dyn TransactionSigner> = signers
            .iter()
            .copied()
            .filter(|s| requirement.contains(&s.address()))
            .collect();

        if matched.is_empty() && read_call && self.expected.is_empty() {
            debug!("read-only call; nothing to sign");
            return Err(ContractError::NoSignatureNeeded {
                result: simulated_value,
            });
        }

        // The held source signer joins in for its own auth entries and envelope.
        let held = self.source_signer.clone();
        let mut active = matched;
        if let Some(held) = held.as_deref() {
            let address = held.address();
            if requirement.contains(&address) && !active.iter().any(|s| s.address() == address) {
                active.push(held);
            }
        }

        // Auth entries are part of the hashed transaction, so they go first.
        let network_id = self.context.network.network_id();
        let mut entries = auth_entries(&self.envelope);
        let mut changed = false;
        for signer in active.iter().filter(|s| requirement.signs_auth(&s.address())) {
            let address = signer.address();
            for entry in entries.iter_mut() {
                if auth_entry_address(entry).as_deref() == Some(address.as_str())
                    && !auth_entry_is_signed(entry)
                {
                    *entry = sign_auth_entry(entry, *signer, &network_id, expiration)?;
                    changed = true;
                }
            }
            if self.signatures.record_auth(&address) {
                debug!(%address, expiration, "auth entries signed");
            }
        }
        if changed {
            self.envelope = replace_auth_entries(self.envelope.clone(), entries)?;
            self.signatures.invalidate_envelope();
        }

        let auth_complete = requirement
            .discovered
            .iter()
            .all(|address| self.signatures.has_auth(address));
        if auth_complete {
            let tx_hash = transaction_hash(&self.envelope, &self.context.network.passphrase)?;
            for signer in active
                .iter()
                .copied()
                .filter(|s| requirement.signs_envelope(&s.address()))
            {
                let address = signer.address();
                if self.signatures.has_envelope(&address)
                    && self.signatures.signed_hash() == Some(tx_hash)
                {
                    continue;
                }
                let signature = decorated_signature(signer, &tx_hash)?;
                self.signatures.record_envelope(&address, signature, tx_hash);
                debug!(%address, "envelope signed");
            }
        }

        if self.missing_signers().is_empty() {
            self.state = AssemblyState::Signed;
            debug!(invocation = %self.invocation.label(), "all signatures collected");
            Ok(AssemblyState::Signed)
        } else {
            self.state = AssemblyState::NeedsMoreSignatures;
            Err(ContractError::NeedsMoreSignatures {
                missing: self.outstanding(),
            })
        }
    }

    /// Submit the signed envelope and poll it to a terminal status.
    ///
    /// The signer set is re-checked before anything reaches the network.
    pub async fn send(&mut self) -> Result<TransactionResult, ContractError> {
        self.require_simulated("send")?;
        if !self.missing_signers().is_empty() {
            if self.state == AssemblyState::Signed {
                self.state = AssemblyState::NeedsMoreSignatures;
            }
            return Err(ContractError::NeedsMoreSignatures {
                missing: self.outstanding(),
            });
        }

        let envelope = self.signed_envelope()?;
        let poller = self.context.poller();
        let handle = poller.send(&envelope).await?;
        self.submitted_hash = Some(handle.hash.clone());
        self.state = AssemblyState::Sent;

        self.await_outcome(&poller, &handle).await
    }

    /// Submit the host function and signed auth entries through the relayer,
    /// which builds and pays for its own envelope.
    pub async fn relay_host_function(&mut self) -> Result<TransactionResult, ContractError> {
        self.require_simulated("relay")?;
        let requirement = self.requirement().ok_or(ContractError::NotYetSimulated)?;
        let missing: Vec<String> = requirement
            .discovered
            .iter()
            .filter(|address| !self.signatures.has_auth(address))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ContractError::NeedsMoreSignatures { missing });
        }

        let func = host_function(&self.envelope)
            .ok_or_else(|| ContractError::Xdr("envelope carries no host function".into()))?;
        let request = RelayRequest::HostFunction {
            func,
            auth: auth_entries(&self.envelope),
        };

        let poller = self.context.poller();
        let handle = poller.relay(request).await?;
        self.submitted_hash = Some(handle.hash.clone());
        self.state = AssemblyState::Sent;

        self.await_outcome(&poller, &handle).await
    }

    /// Resume polling after `TransactionStillPending` or an interrupted poll.
    pub async fn poll_again(&mut self) -> Result<TransactionResult, ContractError> {
        let hash = match (self.state, &self.submitted_hash) {
            (AssemblyState::Sent | AssemblyState::StillPending, Some(hash)) => hash.clone(),
            (state, _) => {
                return Err(ContractError::InvalidState {
                    operation: "poll",
                    state,
                })
            }
        };
        self.state = AssemblyState::Sent;
        let poller = self.context.poller();
        self.await_outcome(&poller, &PendingHandle { hash }).await
    }

    async fn await_outcome(
        &mut self,
        poller: &SubmissionPoller,
        handle: &PendingHandle,
    ) -> Result<TransactionResult, ContractError> {
        let outcome = poller.poll(handle).await?;
        self.outcome = Some(outcome.clone());

        match outcome {
            SubmissionOutcome::Success {
                hash,
                ledger,
                return_value,
                ..
            } => {
                self.state = AssemblyState::Success;
                Ok(TransactionResult {
                    hash,
                    ledger,
                    return_value: return_value.or_else(|| self.simulated_value().cloned()),
                })
            }
            SubmissionOutcome::Failed {
                hash,
                ledger,
                result_xdr,
                diagnostic_events,
            } => {
                self.state = AssemblyState::Failed;
                Err(ContractError::TransactionFailed {
                    hash,
                    ledger,
                    result_xdr,
                    diagnostic_events,
                })
            }
            SubmissionOutcome::StillPending {
                hash,
                last_status,
                elapsed,
            } => {
                self.state = AssemblyState::StillPending;
                Err(ContractError::TransactionStillPending {
                    hash,
                    last_status,
                    elapsed,
                })
            }
        }
    }
}

fn build_envelope(
    options: &ClientOptions,
    invocation: &Invocation,
    source: &AccountInfo,
) -> Result<TransactionEnvelope, ContractError> {
    build_transaction(
        &source.account_id,
        source.sequence + 1,
        options.base_fee,
        options.timeout_seconds,
        invoke_operation(invocation.host_function()?),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
