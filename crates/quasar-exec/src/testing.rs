//! Test doubles: a scripted RPC, a scripted relayer and XDR fixtures.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use stellar_xdr::curr::{
    ContractDataDurability, ExtensionPoint, HostFunction, InvokeContractArgs, LedgerEntryChanges,
    LedgerFootprint, LedgerKey, LedgerKeyContractData, Limits, ReadXdr, ScVal,
    SorobanAddressCredentials, SorobanAuthorizationEntry, SorobanAuthorizedFunction,
    SorobanAuthorizedInvocation, SorobanCredentials, SorobanResources, SorobanTransactionData,
    SorobanTransactionDataExt, SorobanTransactionMeta, SorobanTransactionMetaExt,
    TransactionEnvelope, TransactionMeta, TransactionMetaV3, VecM, WriteXdr,
};

use quasar_compile::{decode_address, to_symbol};

use crate::error::RpcError;
use crate::relayer::{RelayRequest, RelayResponse, Relayer};
use crate::rpc::{GetTransactionResponse, SendTransactionResponse, SorobanRpc};
use crate::sign::Keypair;
use crate::transaction::{build_transaction, invoke_operation};
use crate::types::{AccountInfo, TransactionStatus};

pub(crate) const CONTRACT: &str = "CAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAABSC4";

pub(crate) fn keypair(seed: u8) -> Keypair {
    Keypair::from_seed([seed; 32])
}

pub(crate) fn invoke_host_function() -> HostFunction {
    HostFunction::InvokeContract(InvokeContractArgs {
        contract_address: decode_address(CONTRACT).unwrap(),
        function_name: to_symbol("transfer").unwrap(),
        args: vec![ScVal::Bool(true)].try_into().unwrap(),
    })
}

pub(crate) fn invoke_envelope(source: &str, sequence: i64) -> TransactionEnvelope {
    build_transaction(source, sequence, 100, 300, invoke_operation(invoke_host_function()))
        .unwrap()
}

/// Transaction data whose footprint is read-only or read-write.
pub(crate) fn tx_data(read_write: bool, resource_fee: i64) -> SorobanTransactionData {
    let key = LedgerKey::ContractData(LedgerKeyContractData {
        contract: decode_address(CONTRACT).unwrap(),
        key: ScVal::LedgerKeyContractInstance,
        durability: ContractDataDurability::Persistent,
    });
    let (read_only, rw) = if read_write {
        (vec![], vec![key])
    } else {
        (vec![key], vec![])
    };
    SorobanTransactionData {
        ext: SorobanTransactionDataExt::V0,
        resources: SorobanResources {
            footprint: LedgerFootprint {
                read_only: read_only.try_into().unwrap(),
                read_write: rw.try_into().unwrap(),
            },
            instructions: 100_000,
            disk_read_bytes: 1024,
            write_bytes: 512,
        },
        resource_fee,
    }
}

fn invocation() -> SorobanAuthorizedInvocation {
    SorobanAuthorizedInvocation {
        function: SorobanAuthorizedFunction::ContractFn(InvokeContractArgs {
            contract_address: decode_address(CONTRACT).unwrap(),
            function_name: to_symbol("transfer").unwrap(),
            args: VecM::default(),
        }),
        sub_invocations: VecM::default(),
    }
}

/// Unsigned auth entry requiring `address` to sign.
pub(crate) fn address_auth_entry(address: &str, nonce: i64) -> SorobanAuthorizationEntry {
    SorobanAuthorizationEntry {
        credentials: SorobanCredentials::Address(SorobanAddressCredentials {
            address: decode_address(address).unwrap(),
            nonce,
            signature_expiration_ledger: 0,
            signature: ScVal::Void,
        }),
        root_invocation: invocation(),
    }
}

pub(crate) fn source_auth_entry() -> SorobanAuthorizationEntry {
    SorobanAuthorizationEntry {
        credentials: SorobanCredentials::SourceAccount,
        root_invocation: invocation(),
    }
}

/// A successful `simulateTransaction` result.
pub(crate) fn sim_success(
    auth: &[SorobanAuthorizationEntry],
    read_write: bool,
    return_value: Option<ScVal>,
) -> Value {
    let auth: Vec<String> = auth
        .iter()
        .map(|e| e.to_xdr_base64(Limits::none()).unwrap())
        .collect();
    let mut first = json!({ "auth": auth });
    if let Some(value) = return_value {
        first["xdr"] = json!(value.to_xdr_base64(Limits::none()).unwrap());
    }
    json!({
        "transactionData": tx_data(read_write, 50_000).to_xdr_base64(Limits::none()).unwrap(),
        "minResourceFee": "50000",
        "events": [],
        "results": [first],
        "cost": { "cpuInsns": "100000", "memBytes": "5000" },
        "latestLedger": 1000
    })
}

pub(crate) fn sim_failure(error: &str) -> Value {
    json!({ "error": error, "events": ["AAAAAQ=="], "latestLedger": 1000 })
}

/// A simulation that reports archived state.
pub(crate) fn sim_restore() -> Value {
    let mut raw = sim_success(&[], true, None);
    raw["restorePreamble"] = json!({
        "transactionData": tx_data(true, 20_000).to_xdr_base64(Limits::none()).unwrap(),
        "minResourceFee": "20000"
    });
    raw
}

/// `TransactionMeta` v3 carrying a contract return value, base64 XDR.
pub(crate) fn success_meta(return_value: ScVal) -> String {
    TransactionMeta::V3(TransactionMetaV3 {
        ext: ExtensionPoint::V0,
        tx_changes_before: LedgerEntryChanges(VecM::default()),
        operations: VecM::default(),
        tx_changes_after: LedgerEntryChanges(VecM::default()),
        soroban_meta: Some(SorobanTransactionMeta {
            ext: SorobanTransactionMetaExt::V0,
            events: VecM::default(),
            return_value,
            diagnostic_events: VecM::default(),
        }),
    })
    .to_xdr_base64(Limits::none())
    .unwrap()
}

/// Scripted RPC. Queued simulations and sends are consumed in order; the last
/// queued status repeats. With nothing queued, sends are `PENDING` and
/// statuses are `SUCCESS`.
pub(crate) struct MockRpc {
    sequence: i64,
    simulations: Mutex<VecDeque<Value>>,
    sends: Mutex<VecDeque<SendTransactionResponse>>,
    statuses: Mutex<VecDeque<GetTransactionResponse>>,
    ledger_entries: Mutex<Value>,
    simulated: Mutex<Vec<String>>,
    sent: Mutex<Vec<String>>,
    get_calls: AtomicUsize,
    ledger_calls: AtomicUsize,
}

impl MockRpc {
    pub(crate) fn new(sequence: i64) -> Self {
        Self {
            sequence,
            simulations: Mutex::new(VecDeque::new()),
            sends: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            ledger_entries: Mutex::new(json!({ "entries": [], "latestLedger": 1000 })),
            simulated: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            get_calls: AtomicUsize::new(0),
            ledger_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn push_simulation(&self, raw: Value) {
        self.simulations.lock().unwrap().push_back(raw);
    }

    pub(crate) fn push_send(&self, status: &str, hash: &str) {
        self.sends.lock().unwrap().push_back(SendTransactionResponse {
            hash: hash.to_string(),
            status: status.to_string(),
            error_result_xdr: None,
            diagnostic_events_xdr: vec![],
        });
    }

    pub(crate) fn push_status(&self, status: TransactionStatus, meta: Option<String>) {
        let ledger = status.is_terminal().then_some(1234);
        self.statuses.lock().unwrap().push_back(GetTransactionResponse {
            status,
            ledger,
            result_xdr: None,
            result_meta_xdr: meta,
            envelope_xdr: None,
            diagnostic_events_xdr: vec![],
        });
    }

    pub(crate) fn set_ledger_entries(&self, raw: Value) {
        *self.ledger_entries.lock().unwrap() = raw;
    }

    pub(crate) fn simulate_calls(&self) -> usize {
        self.simulated.lock().unwrap().len()
    }

    pub(crate) fn send_calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub(crate) fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn ledger_calls(&self) -> usize {
        self.ledger_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn sent(&self) -> Vec<TransactionEnvelope> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|b64| TransactionEnvelope::from_xdr_base64(b64, Limits::none()).unwrap())
            .collect()
    }

    pub(crate) fn simulated(&self) -> Vec<TransactionEnvelope> {
        self.simulated
            .lock()
            .unwrap()
            .iter()
            .map(|b64| TransactionEnvelope::from_xdr_base64(b64, Limits::none()).unwrap())
            .collect()
    }
}

#[async_trait]
impl SorobanRpc for MockRpc {
    async fn get_account(&self, account_id: &str) -> Result<AccountInfo, RpcError> {
        Ok(AccountInfo {
            account_id: account_id.to_string(),
            sequence: self.sequence,
        })
    }

    async fn simulate_transaction(&self, tx_xdr_base64: &str) -> Result<Value, RpcError> {
        self.simulated
            .lock()
            .unwrap()
            .push(tx_xdr_base64.to_string());
        self.simulations
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RpcError::Rpc {
                code: -32000,
                message: "no scripted simulation".to_string(),
            })
    }

    async fn send_transaction(
        &self,
        tx_xdr_base64: &str,
    ) -> Result<SendTransactionResponse, RpcError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(tx_xdr_base64.to_string());
        let n = sent.len();
        Ok(self
            .sends
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| SendTransactionResponse {
                hash: format!("tx{}", n),
                status: "PENDING".to_string(),
                error_result_xdr: None,
                diagnostic_events_xdr: vec![],
            }))
    }

    async fn get_transaction(&self, _hash: &str) -> Result<GetTransactionResponse, RpcError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let mut statuses = self.statuses.lock().unwrap();
        let response = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        Ok(response.unwrap_or(GetTransactionResponse {
            status: TransactionStatus::Success,
            ledger: Some(1234),
            result_xdr: None,
            result_meta_xdr: None,
            envelope_xdr: None,
            diagnostic_events_xdr: vec![],
        }))
    }

    async fn get_ledger_entries(&self, _keys: &[String]) -> Result<Value, RpcError> {
        self.ledger_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ledger_entries.lock().unwrap().clone())
    }
}

/// Relayer answering every request with one scripted response.
pub(crate) struct MockRelayer {
    response: RelayResponse,
    requests: Mutex<Vec<RelayRequest>>,
}

impl MockRelayer {
    pub(crate) fn accepting(hash: &str) -> Self {
        Self::responding(RelayResponse {
            success: true,
            hash: Some(hash.to_string()),
            status: Some("PENDING".to_string()),
            ..Default::default()
        })
    }

    pub(crate) fn responding(response: RelayResponse) -> Self {
        Self {
            response,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<RelayRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Relayer for MockRelayer {
    async fn relay(&self, request: RelayRequest) -> Result<RelayResponse, RpcError> {
        self.requests.lock().unwrap().push(request);
        Ok(self.response.clone())
    }
}
