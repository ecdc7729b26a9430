//! Contract deployment: upload the code, then instantiate it with
//! schema-checked constructor arguments.

use sha2::{Digest, Sha256};
use stellar_xdr::curr::{
    AccountId, ContractIdPreimage, ContractIdPreimageFromAddress, Hash, HashIdPreimage,
    HashIdPreimageContractId, LedgerKey, LedgerKeyContractCode, Limits, PublicKey, ScAddress,
    ScVal, Uint256, WriteXdr,
};
use tracing::{info, warn};

use quasar_compile::{
    contract_strkey, decode_account_id, decode_address, encode_address, ConstructorSchema, IrValue,
};

use crate::assembler::Invocation;
use crate::client::ContractClient;
use crate::error::{ContractError, InvokeFailure, RpcError};

/// A WASM to deploy plus its constructor arguments by name.
#[derive(Debug, Clone, Default)]
pub struct DeployRequest {
    pub wasm: Vec<u8>,
    pub constructor_args: Vec<(String, IrValue)>,
    /// Declared constructor parameters; read from the WASM when absent
    pub schema: Option<ConstructorSchema>,
    /// Contract id salt; derived from the deployer and sequence when absent
    pub salt: Option<[u8; 32]>,
}

impl DeployRequest {
    pub fn new(wasm: Vec<u8>) -> Self {
        Self {
            wasm,
            ..Default::default()
        }
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: IrValue) -> Self {
        self.constructor_args.push((name.into(), value));
        self
    }

    pub fn with_schema(mut self, schema: ConstructorSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_salt(mut self, salt: [u8; 32]) -> Self {
        self.salt = Some(salt);
        self
    }
}

/// A deployed contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployResult {
    /// C... address of the new contract
    pub contract_id: String,
    /// Hex SHA-256 of the WASM
    pub wasm_hash: String,
    /// `None` when the code was already installed
    pub upload_hash: Option<String>,
    pub create_hash: Option<String>,
}

impl ContractClient {
    /// Install `request.wasm` if needed and create a contract from it.
    ///
    /// Constructor arguments are checked against the schema before any
    /// network call.
    pub async fn deploy(&self, request: DeployRequest) -> Result<DeployResult, InvokeFailure> {
        let schema = match request.schema {
            Some(schema) => schema,
            None => ConstructorSchema::from_wasm(&request.wasm)
                .map_err(|e| InvokeFailure::detached(e.into()))?,
        };
        let constructor_args = schema
            .validate(&request.constructor_args)
            .map_err(|e| InvokeFailure::detached(e.into()))?;

        let wasm_hash: [u8; 32] = Sha256::digest(&request.wasm).into();
        let deployer = self.source_address();

        let upload_hash = if self
            .code_exists(&wasm_hash)
            .await
            .map_err(|e| InvokeFailure::detached(e.into()))?
        {
            info!(wasm_hash = %hex::encode(wasm_hash), "code already installed; skipping upload");
            None
        } else {
            let tx = self
                .assemble(Invocation::UploadWasm { wasm: request.wasm })
                .await
                .map_err(InvokeFailure::detached)?;
            self.drive(tx, &[]).await?.hash
        };

        let source = self
            .context
            .rpc
            .get_account(&deployer)
            .await
            .map_err(|e| InvokeFailure::detached(e.into()))?;
        let salt = match request.salt {
            Some(salt) => salt,
            None => derive_salt(&deployer, &wasm_hash, source.sequence + 1)
                .map_err(InvokeFailure::detached)?,
        };

        let expected_id = contract_id(&self.context.network.network_id(), &deployer, &salt)
            .map_err(InvokeFailure::detached)?;
        let invocation = Invocation::CreateContract {
            deployer,
            wasm_hash,
            salt,
            constructor_args,
        };
        let tx = self
            .assemble_with(invocation, source)
            .map_err(InvokeFailure::detached)?;
        let created = self.drive(tx, &[]).await?;

        let contract_id = match &created.value {
            Some(ScVal::Address(address @ ScAddress::Contract(_))) => {
                let returned = encode_address(address)
                    .map_err(|e| InvokeFailure::detached(e.into()))?;
                if returned != expected_id {
                    warn!(%returned, expected = %expected_id, "network returned an unexpected contract id");
                }
                returned
            }
            _ => expected_id,
        };
        info!(%contract_id, "contract deployed");

        Ok(DeployResult {
            contract_id,
            wasm_hash: hex::encode(wasm_hash),
            upload_hash,
            create_hash: created.hash,
        })
    }

    async fn code_exists(&self, wasm_hash: &[u8; 32]) -> Result<bool, RpcError> {
        let key = LedgerKey::ContractCode(LedgerKeyContractCode {
            hash: Hash(*wasm_hash),
        })
        .to_xdr_base64(Limits::none())
        .map_err(|e| RpcError::Xdr(e.to_string()))?;

        let response = self.context.rpc.get_ledger_entries(&[key]).await?;
        Ok(response
            .get("entries")
            .and_then(|entries| entries.as_array())
            .is_some_and(|entries| !entries.is_empty()))
    }
}

/// Contract id of a contract created by `deployer` with `salt`.
pub fn contract_id(
    network_id: &[u8; 32],
    deployer: &str,
    salt: &[u8; 32],
) -> Result<String, ContractError> {
    let preimage = HashIdPreimage::ContractId(HashIdPreimageContractId {
        network_id: Hash(*network_id),
        contract_id_preimage: ContractIdPreimage::Address(ContractIdPreimageFromAddress {
            address: decode_address(deployer)?,
            salt: Uint256(*salt),
        }),
    });
    let hash: [u8; 32] = Sha256::digest(preimage.to_xdr(Limits::none())?).into();
    Ok(contract_strkey(&hash))
}

/// SHA-256(deployer key || wasm hash || sequence), unique per deployer transaction.
fn derive_salt(deployer: &str, wasm_hash: &[u8; 32], sequence: i64) -> Result<[u8; 32], ContractError> {
    let AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(key))) = decode_account_id(deployer)?;

    let mut hasher = Sha256::new();
    hasher.update(key);
    hasher.update(wasm_hash);
    hasher.update(sequence.to_be_bytes());
    Ok(hasher.finalize().into())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use stellar_xdr::curr::{HostFunction, OperationBody, TransactionEnvelope};

    use quasar_compile::{ArgType, ParamSpec};

    use crate::config::{ClientOptions, Network};
    use crate::sign::TransactionSigner;
    use crate::testing::{keypair, sim_success, MockRpc};

    const WASM: &[u8] = b"\0asm\x01\0\0\0";

    fn client(rpc: &Arc<MockRpc>) -> ContractClient {
        ContractClient::new(rpc.clone(), Network::testnet(), Arc::new(keypair(1))).with_options(
            ClientOptions::default().with_poll(Duration::from_millis(100), Duration::from_secs(1)),
        )
    }

    fn host_function(envelope: &TransactionEnvelope) -> HostFunction {
        let TransactionEnvelope::Tx(v1) = envelope else {
            panic!("expected Tx envelope");
        };
        match &v1.tx.operations[0].body {
            OperationBody::InvokeHostFunction(op) => op.host_function.clone(),
            other => panic!("expected InvokeHostFunction, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn uploads_then_creates() {
        let rpc = Arc::new(MockRpc::new(10));
        rpc.push_simulation(sim_success(&[], true, None));
        rpc.push_simulation(sim_success(&[], true, None));
        let schema = ConstructorSchema::new(vec![ParamSpec::required("admin", ArgType::Address)]);
        let admin = keypair(2).address();

        let result = client(&rpc)
            .deploy(
                DeployRequest::new(WASM.to_vec())
                    .with_schema(schema)
                    .with_arg("admin", IrValue::Address(admin))
                    .with_salt([7; 32]),
            )
            .await
            .unwrap();

        assert_eq!(rpc.send_calls(), 2);
        assert_eq!(rpc.ledger_calls(), 1);
        assert!(result.upload_hash.is_some());
        assert_eq!(result.wasm_hash, hex::encode(Sha256::digest(WASM)));

        let expected = contract_id(
            &Network::testnet().network_id(),
            &keypair(1).address(),
            &[7; 32],
        )
        .unwrap();
        assert_eq!(result.contract_id, expected);
        assert!(result.contract_id.starts_with('C'));

        let sent = rpc.sent();
        assert!(matches!(host_function(&sent[0]), HostFunction::UploadContractWasm(_)));
        match host_function(&sent[1]) {
            HostFunction::CreateContractV2(args) => {
                assert_eq!(args.constructor_args.len(), 1);
            }
            other => panic!("expected CreateContractV2, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn skips_upload_when_code_exists() {
        let rpc = Arc::new(MockRpc::new(10));
        rpc.set_ledger_entries(json!({
            "entries": [{ "key": "AAAA", "xdr": "AAAA" }],
            "latestLedger": 1000
        }));
        rpc.push_simulation(sim_success(&[], true, None));

        let result = client(&rpc)
            .deploy(DeployRequest::new(WASM.to_vec()))
            .await
            .unwrap();
        assert!(result.upload_hash.is_none());
        assert_eq!(rpc.send_calls(), 1);
    }

    #[tokio::test]
    async fn returned_contract_id_wins() {
        let rpc = Arc::new(MockRpc::new(10));
        rpc.set_ledger_entries(json!({ "entries": [{}] }));
        let returned = ScAddress::Contract(stellar_xdr::curr::ContractId(Hash([9; 32])));
        rpc.push_simulation(sim_success(&[], true, Some(ScVal::Address(returned))));

        let result = client(&rpc)
            .deploy(DeployRequest::new(WASM.to_vec()))
            .await
            .unwrap();
        assert_eq!(result.contract_id, contract_strkey(&[9; 32]));
    }

    #[tokio::test]
    async fn bad_constructor_args_fail_before_network() {
        let rpc = Arc::new(MockRpc::new(10));
        let schema = ConstructorSchema::new(vec![ParamSpec::required("admin", ArgType::Address)]);

        let failure = client(&rpc)
            .deploy(DeployRequest::new(WASM.to_vec()).with_schema(schema.clone()))
            .await
            .unwrap_err();
        assert!(matches!(failure.error, ContractError::InvalidArgument(_)));
        assert!(failure.transaction.is_none());

        let failure = client(&rpc)
            .deploy(
                DeployRequest::new(WASM.to_vec())
                    .with_schema(schema)
                    .with_arg("admin", IrValue::U32(1)),
            )
            .await
            .unwrap_err();
        assert!(matches!(failure.error, ContractError::InvalidArgument(_)));

        assert_eq!(rpc.ledger_calls(), 0);
        assert_eq!(rpc.simulate_calls(), 0);
    }

    #[test]
    fn derived_salt_depends_on_sequence() {
        let deployer = keypair(1).address();
        let a = derive_salt(&deployer, &[1; 32], 11).unwrap();
        let b = derive_salt(&deployer, &[1; 32], 12).unwrap();
        assert_ne!(a, b);
    }
}
