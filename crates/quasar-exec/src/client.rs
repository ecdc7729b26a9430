//! Top-level entry point: turns a contract call into a full
//! build -> simulate -> [restore] -> sign -> send -> poll run.

use std::sync::Arc;

use stellar_xdr::curr::ScVal;
use tracing::{debug, info};

use quasar_compile::{from_scval, IrValue, XdrError};

use crate::assembler::{AssembledTransaction, AssemblyContext, AssemblyState, Invocation};
use crate::config::{ClientOptions, Network};
use crate::error::{ContractError, InvokeFailure};
use crate::relayer::Relayer;
use crate::rpc::{RpcClient, SorobanRpc};
use crate::sign::TransactionSigner;
use crate::simulator::SimulationCoordinator;
use crate::types::{AccountInfo, SimulationOutcome};

/// Value of a finished invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeResult {
    pub value: Option<ScVal>,
    /// `None` for read-only calls answered by simulation
    pub hash: Option<String>,
    pub ledger: Option<u64>,
}

impl InvokeResult {
    /// The returned value as a native value. `Void` becomes `None`.
    pub fn native(&self) -> Result<Option<IrValue>, XdrError> {
        match &self.value {
            None | Some(ScVal::Void) => Ok(None),
            Some(value) => from_scval(value).map(Some),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.hash.is_none()
    }
}

/// Invokes contracts on behalf of one source account.
pub struct ContractClient {
    pub(crate) context: AssemblyContext,
    pub(crate) signer: Arc<dyn TransactionSigner>,
}

impl ContractClient {
    pub fn new(
        rpc: Arc<dyn SorobanRpc>,
        network: Network,
        signer: Arc<dyn TransactionSigner>,
    ) -> Self {
        Self {
            context: AssemblyContext::new(rpc, network),
            signer,
        }
    }

    /// Client talking JSON-RPC to `network.rpc_url`.
    pub fn connect(
        network: Network,
        signer: Arc<dyn TransactionSigner>,
    ) -> Result<Self, ContractError> {
        let rpc = RpcClient::new(&network.rpc_url)?;
        Ok(Self::new(Arc::new(rpc), network, signer))
    }

    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.context.options = options;
        self
    }

    /// Submit through `relayer` instead of `sendTransaction`.
    pub fn with_relayer(mut self, relayer: Arc<dyn Relayer>) -> Self {
        self.context.relayer = Some(relayer);
        self
    }

    pub fn source_address(&self) -> String {
        self.signer.address()
    }

    pub fn network(&self) -> &Network {
        &self.context.network
    }

    pub fn options(&self) -> &ClientOptions {
        &self.context.options
    }

    /// Fetch the source account and build `invocation` with the client's
    /// signer held as source signer.
    pub async fn assemble(&self, invocation: Invocation) -> Result<AssembledTransaction, ContractError> {
        let source = self.context.rpc.get_account(&self.source_address()).await?;
        self.assemble_with(invocation, source)
    }

    /// Build against an already known account state.
    pub fn assemble_with(
        &self,
        invocation: Invocation,
        source: AccountInfo,
    ) -> Result<AssembledTransaction, ContractError> {
        Ok(AssembledTransaction::build(self.context.clone(), invocation, source)?
            .with_source_signer(self.signer.clone()))
    }

    /// Dry-run `invocation` without keeping any state.
    pub async fn dry_run(&self, invocation: Invocation) -> Result<SimulationOutcome, ContractError> {
        let tx = self.assemble(invocation).await?;
        SimulationCoordinator::new(self.context.rpc.clone())
            .simulate(tx.envelope())
            .await
    }

    /// Call `function` on `contract` and wait for the result.
    ///
    /// `cosigners` sign auth entries or the envelope where the simulation
    /// says they are required. Read-only calls return the simulated value
    /// without submitting.
    pub async fn invoke(
        &self,
        contract: &str,
        function: &str,
        args: Vec<IrValue>,
        cosigners: &[&dyn TransactionSigner],
    ) -> Result<InvokeResult, InvokeFailure> {
        let invocation = Invocation::call(contract, function, args);
        let tx = self
            .assemble(invocation)
            .await
            .map_err(InvokeFailure::detached)?;
        self.drive(tx, cosigners).await
    }

    /// Run an assembled transaction to completion. On failure the
    /// transaction is handed back with the error.
    pub async fn drive(
        &self,
        mut tx: AssembledTransaction,
        cosigners: &[&dyn TransactionSigner],
    ) -> Result<InvokeResult, InvokeFailure> {
        match self.run(&mut tx, cosigners).await {
            Ok(result) => Ok(result),
            Err(error) => Err(InvokeFailure::new(error, tx)),
        }
    }

    async fn run(
        &self,
        tx: &mut AssembledTransaction,
        cosigners: &[&dyn TransactionSigner],
    ) -> Result<InvokeResult, ContractError> {
        let label = tx.invocation().label();

        if tx.simulate().await? == AssemblyState::NeedsRestoration && self.context.options.auto_restore {
            tx.restore_and_retry().await?;
        }

        match tx.sign(cosigners) {
            Ok(_) => {}
            Err(ContractError::NoSignatureNeeded { result }) => {
                debug!(invocation = %label, "read-only call answered by simulation");
                return Ok(InvokeResult {
                    value: result,
                    hash: None,
                    ledger: None,
                });
            }
            Err(e) => return Err(e),
        }

        let result = tx.send().await?;
        info!(invocation = %label, hash = %result.hash, ledger = ?result.ledger, "invocation complete");
        Ok(InvokeResult {
            value: result.return_value,
            hash: Some(result.hash),
            ledger: result.ledger,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::testing::{
        address_auth_entry, keypair, sim_failure, sim_restore, sim_success, success_meta,
        MockRelayer, MockRpc, CONTRACT,
    };
    use crate::types::TransactionStatus;

    fn client(rpc: &Arc<MockRpc>, seed: u8) -> ContractClient {
        ContractClient::new(rpc.clone(), Network::testnet(), Arc::new(keypair(seed))).with_options(
            ClientOptions::default().with_poll(Duration::from_millis(100), Duration::from_secs(1)),
        )
    }

    #[tokio::test]
    async fn read_call_returns_value_without_submitting() {
        let rpc = Arc::new(MockRpc::new(10));
        rpc.push_simulation(sim_success(&[], false, Some(ScVal::U32(5))));

        let result = client(&rpc, 1)
            .invoke(CONTRACT, "balance", vec![], &[])
            .await
            .unwrap();
        assert!(result.is_read_only());
        assert_eq!(result.native().unwrap(), Some(IrValue::U32(5)));
        assert_eq!(rpc.send_calls(), 0);
    }

    #[tokio::test]
    async fn write_call_submits_and_unwraps() {
        let rpc = Arc::new(MockRpc::new(10));
        rpc.push_simulation(sim_success(&[], true, None));
        rpc.push_status(TransactionStatus::Success, Some(success_meta(ScVal::I32(-3))));

        let result = client(&rpc, 1)
            .invoke(CONTRACT, "transfer", vec![IrValue::U32(1)], &[])
            .await
            .unwrap();
        assert_eq!(result.hash.as_deref(), Some("tx1"));
        assert_eq!(result.ledger, Some(1234));
        assert_eq!(result.native().unwrap(), Some(IrValue::I32(-3)));
    }

    #[tokio::test(start_paused = true)]
    async fn sub_second_poll_timeout_reaches_the_poller() {
        let rpc = Arc::new(MockRpc::new(10));
        rpc.push_simulation(sim_success(&[], true, None));
        rpc.push_status(TransactionStatus::NotFound, None);
        let client = ContractClient::new(rpc.clone(), Network::testnet(), Arc::new(keypair(1)))
            .with_options(
                ClientOptions::default()
                    .with_poll(Duration::from_millis(100), Duration::from_millis(500)),
            );

        let started = tokio::time::Instant::now();
        let failure = client
            .invoke(CONTRACT, "transfer", vec![], &[])
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(
            failure.error,
            ContractError::TransactionStillPending { .. }
        ));
        assert!(elapsed >= Duration::from_millis(500), "{:?}", elapsed);
        assert!(elapsed <= Duration::from_millis(600), "{:?}", elapsed);
        assert_eq!(rpc.get_calls(), 6);
    }

    #[tokio::test]
    async fn cosigner_authorizes_entry() {
        let rpc = Arc::new(MockRpc::new(10));
        let b = keypair(2);
        rpc.push_simulation(sim_success(&[address_auth_entry(&b.address(), 1)], true, None));

        let result = client(&rpc, 1)
            .invoke(CONTRACT, "transfer", vec![], &[&b])
            .await
            .unwrap();
        assert!(!result.is_read_only());
        assert_eq!(rpc.send_calls(), 1);
    }

    #[tokio::test]
    async fn missing_cosigner_hands_back_transaction() {
        let rpc = Arc::new(MockRpc::new(10));
        let b = keypair(2);
        rpc.push_simulation(sim_success(&[address_auth_entry(&b.address(), 1)], true, None));

        let failure = client(&rpc, 1)
            .invoke(CONTRACT, "transfer", vec![], &[])
            .await
            .unwrap_err();
        match &failure.error {
            ContractError::NeedsMoreSignatures { missing } => {
                assert_eq!(missing, &vec![b.address()]);
            }
            other => panic!("expected NeedsMoreSignatures, got {:?}", other),
        }

        // the caller can finish the job with the returned transaction
        let mut tx = failure.transaction.unwrap();
        assert_eq!(tx.state(), AssemblyState::NeedsMoreSignatures);
        assert_eq!(tx.sign(&[&b]).unwrap(), AssemblyState::Signed);
        tx.send().await.unwrap();
        assert_eq!(rpc.send_calls(), 1);
    }

    #[tokio::test]
    async fn simulation_failure_is_surfaced() {
        let rpc = Arc::new(MockRpc::new(10));
        rpc.push_simulation(sim_failure("HostError: trapped"));

        let failure = client(&rpc, 1)
            .invoke(CONTRACT, "transfer", vec![], &[])
            .await
            .unwrap_err();
        assert!(matches!(
            failure.error,
            ContractError::SimulationFailed { ref diagnostic, .. } if diagnostic == "HostError: trapped"
        ));
        assert_eq!(rpc.send_calls(), 0);
    }

    #[tokio::test]
    async fn restores_automatically() {
        let rpc = Arc::new(MockRpc::new(10));
        rpc.push_simulation(sim_restore());
        rpc.push_simulation(sim_success(&[], true, None));

        client(&rpc, 1)
            .invoke(CONTRACT, "transfer", vec![], &[])
            .await
            .unwrap();
        assert_eq!(rpc.send_calls(), 2);
        assert_eq!(rpc.simulate_calls(), 2);
    }

    #[tokio::test]
    async fn auto_restore_can_be_disabled() {
        let rpc = Arc::new(MockRpc::new(10));
        rpc.push_simulation(sim_restore());

        let client = client(&rpc, 1);
        let options = client.options().clone().with_auto_restore(false);
        let failure = client
            .with_options(options)
            .invoke(CONTRACT, "transfer", vec![], &[])
            .await
            .unwrap_err();
        assert!(matches!(
            failure.error,
            ContractError::ExpiredState {
                min_resource_fee: 20_000
            }
        ));
        assert_eq!(rpc.send_calls(), 0);
    }

    #[tokio::test]
    async fn invalid_contract_fails_before_network() {
        let rpc = Arc::new(MockRpc::new(10));
        let failure = client(&rpc, 1)
            .invoke("not-a-contract", "transfer", vec![], &[])
            .await
            .unwrap_err();
        assert!(matches!(failure.error, ContractError::InvalidArgument(_)));
        assert!(failure.transaction.is_none());
        assert_eq!(rpc.simulate_calls(), 0);
    }

    #[tokio::test]
    async fn relayer_submits_for_client() {
        let rpc = Arc::new(MockRpc::new(10));
        rpc.push_simulation(sim_success(&[], true, None));
        let relayer = Arc::new(MockRelayer::accepting("relayed"));

        let result = client(&rpc, 1)
            .with_relayer(relayer.clone())
            .invoke(CONTRACT, "transfer", vec![], &[])
            .await
            .unwrap();
        assert_eq!(result.hash.as_deref(), Some("relayed"));
        assert_eq!(relayer.requests().len(), 1);
        assert_eq!(rpc.send_calls(), 0);
    }

    #[tokio::test]
    async fn dry_run_keeps_nothing() {
        let rpc = Arc::new(MockRpc::new(10));
        rpc.push_simulation(sim_success(&[], false, Some(ScVal::Bool(true))));
        let outcome = client(&rpc, 1)
            .dry_run(Invocation::call(CONTRACT, "get", vec![]))
            .await
            .unwrap();
        assert!(matches!(outcome, SimulationOutcome::Success(_)));
        assert_eq!(rpc.send_calls(), 0);
    }

    #[test]
    fn void_result_is_none() {
        let result = InvokeResult {
            value: Some(ScVal::Void),
            hash: Some("h".into()),
            ledger: None,
        };
        assert_eq!(result.native().unwrap(), None);
    }
}
