//! Build, assemble and hash Stellar `TransactionEnvelope`s.

use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use stellar_xdr::curr::{
    DecoratedSignature, ExtensionPoint, HostFunction, InvokeHostFunctionOp, Limits, Memo,
    MuxedAccount, Operation, OperationBody, Preconditions, RestoreFootprintOp, SequenceNumber,
    SorobanAuthorizationEntry, SorobanTransactionData, TimeBounds, TimePoint, Transaction,
    TransactionEnvelope, TransactionExt, TransactionV1Envelope, Uint256, VecM, WriteXdr,
};

use quasar_compile::decode_account_id;

use crate::error::ContractError;

fn xdr_err(what: &str) -> impl Fn(stellar_xdr::curr::Error) -> ContractError + '_ {
    move |e| ContractError::Xdr(format!("{}: {}", what, e))
}

/// Operation invoking a host function, with no auth entries yet.
pub fn invoke_operation(host_function: HostFunction) -> Operation {
    Operation {
        source_account: None,
        body: OperationBody::InvokeHostFunction(InvokeHostFunctionOp {
            host_function,
            auth: VecM::default(),
        }),
    }
}

/// Operation restoring the archived entries named in the footprint.
pub fn restore_operation() -> Operation {
    Operation {
        source_account: None,
        body: OperationBody::RestoreFootprint(RestoreFootprintOp {
            ext: ExtensionPoint::V0,
        }),
    }
}

/// Build an unsigned single-operation envelope.
///
/// With a non-zero `timeout_seconds` the transaction gets an upper time
/// bound of now + timeout.
pub fn build_transaction(
    source_account: &str,
    sequence_number: i64,
    fee: u32,
    timeout_seconds: u64,
    operation: Operation,
) -> Result<TransactionEnvelope, ContractError> {
    let account = decode_account_id(source_account)?;
    let stellar_xdr::curr::PublicKey::PublicKeyTypeEd25519(key) = account.0;

    let cond = if timeout_seconds == 0 {
        Preconditions::None
    } else {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Preconditions::Time(TimeBounds {
            min_time: TimePoint(0),
            max_time: TimePoint(now.saturating_add(timeout_seconds)),
        })
    };

    let tx = Transaction {
        source_account: MuxedAccount::Ed25519(Uint256(key.0)),
        fee,
        seq_num: SequenceNumber(sequence_number),
        cond,
        memo: Memo::None,
        operations: vec![operation].try_into().map_err(xdr_err("operations"))?,
        ext: TransactionExt::V0,
    };

    Ok(TransactionEnvelope::Tx(TransactionV1Envelope {
        tx,
        signatures: VecM::default(),
    }))
}

/// Apply simulation output to an unsigned envelope:
/// sets `SorobanTransactionData`, sets the fee to `base_fee + min_resource_fee`
/// and installs the auth entries on an `InvokeHostFunction` operation.
pub fn assemble_transaction(
    envelope: TransactionEnvelope,
    transaction_data: &SorobanTransactionData,
    auth: &[SorobanAuthorizationEntry],
    min_resource_fee: u64,
    base_fee: u32,
) -> Result<TransactionEnvelope, ContractError> {
    let TransactionEnvelope::Tx(mut v1) = envelope else {
        return Err(ContractError::Xdr("expected Tx envelope variant".to_string()));
    };

    v1.tx.ext = TransactionExt::V1(transaction_data.clone());

    let total_fee = u64::from(base_fee).saturating_add(min_resource_fee);
    v1.tx.fee = u32::try_from(total_fee).map_err(|_| {
        ContractError::InvalidArgument(format!(
            "fee of {} stroops does not fit in a transaction",
            total_fee
        ))
    })?;

    let mut envelope = TransactionEnvelope::Tx(v1);
    if !auth.is_empty() {
        envelope = replace_auth_entries(envelope, auth.to_vec())?;
    }
    Ok(envelope)
}

/// Auth entries of the envelope's `InvokeHostFunction` operation.
pub fn auth_entries(envelope: &TransactionEnvelope) -> Vec<SorobanAuthorizationEntry> {
    match host_function_op(envelope) {
        Some(op) => op.auth.to_vec(),
        None => Vec::new(),
    }
}

/// The host function being invoked, if this is an invocation envelope.
pub fn host_function(envelope: &TransactionEnvelope) -> Option<HostFunction> {
    host_function_op(envelope).map(|op| op.host_function.clone())
}

fn host_function_op(envelope: &TransactionEnvelope) -> Option<&InvokeHostFunctionOp> {
    let TransactionEnvelope::Tx(v1) = envelope else {
        return None;
    };
    v1.tx.operations.first().and_then(|op| match &op.body {
        OperationBody::InvokeHostFunction(invoke) => Some(invoke),
        _ => None,
    })
}

/// Replace the auth entries on the invocation operation.
///
/// `VecM` has no `DerefMut`, so the operations vector is rebuilt.
pub fn replace_auth_entries(
    envelope: TransactionEnvelope,
    entries: Vec<SorobanAuthorizationEntry>,
) -> Result<TransactionEnvelope, ContractError> {
    let TransactionEnvelope::Tx(mut v1) = envelope else {
        return Err(ContractError::Xdr("expected Tx envelope variant".to_string()));
    };

    let mut ops: Vec<Operation> = v1.tx.operations.to_vec();
    match ops.first_mut().map(|op| &mut op.body) {
        Some(OperationBody::InvokeHostFunction(op)) => {
            op.auth = entries.try_into().map_err(xdr_err("auth vec"))?;
        }
        _ => {
            return Err(ContractError::Xdr(
                "envelope has no InvokeHostFunction operation".to_string(),
            ))
        }
    }
    v1.tx.operations = ops.try_into().map_err(xdr_err("operations"))?;

    Ok(TransactionEnvelope::Tx(v1))
}

/// Replace the envelope's signature list.
pub fn with_signatures(
    envelope: TransactionEnvelope,
    signatures: Vec<DecoratedSignature>,
) -> Result<TransactionEnvelope, ContractError> {
    let TransactionEnvelope::Tx(mut v1) = envelope else {
        return Err(ContractError::Xdr("expected Tx envelope variant".to_string()));
    };
    v1.signatures = signatures.try_into().map_err(xdr_err("signatures vec"))?;
    Ok(TransactionEnvelope::Tx(v1))
}

/// Stellar transaction hash:
/// `SHA256( SHA256(network_passphrase) || EnvelopeTypeTx (0x00000002 BE) || tx_xdr )`
pub fn transaction_hash(
    envelope: &TransactionEnvelope,
    network_passphrase: &str,
) -> Result<[u8; 32], ContractError> {
    let TransactionEnvelope::Tx(v1) = envelope else {
        return Err(ContractError::Xdr("expected Tx envelope variant".to_string()));
    };

    let network_id: [u8; 32] = Sha256::digest(network_passphrase.as_bytes()).into();
    let envelope_type_tx: [u8; 4] = 2_i32.to_be_bytes();
    let tx_xdr = v1.tx.to_xdr(Limits::none()).map_err(xdr_err("serialize tx"))?;

    let mut hasher = Sha256::new();
    hasher.update(network_id);
    hasher.update(envelope_type_tx);
    hasher.update(&tx_xdr);
    Ok(hasher.finalize().into())
}

/// Serialize a `TransactionEnvelope` to base64 XDR.
pub fn envelope_to_base64(envelope: &TransactionEnvelope) -> Result<String, ContractError> {
    envelope
        .to_xdr_base64(Limits::none())
        .map_err(xdr_err("serialize envelope"))
}

#[cfg(test)]
pub(crate) fn sequence_number(envelope: &TransactionEnvelope) -> Option<i64> {
    match envelope {
        TransactionEnvelope::Tx(v1) => Some(v1.tx.seq_num.0),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TESTNET_PASSPHRASE;
    use crate::sign::TransactionSigner;
    use crate::testing::{address_auth_entry, invoke_envelope, keypair, tx_data};
    use stellar_xdr::curr::{ReadXdr, Signature, SignatureHint};

    fn v1(envelope: &TransactionEnvelope) -> &TransactionV1Envelope {
        match envelope {
            TransactionEnvelope::Tx(v1) => v1,
            other => panic!("expected Tx variant, got {:?}", other),
        }
    }

    #[test]
    fn build_envelope_fields() {
        let source = keypair(1).address();
        let envelope = invoke_envelope(&source, 99);
        let b64 = envelope_to_base64(&envelope).unwrap();
        assert!(TransactionEnvelope::from_xdr_base64(&b64, Limits::none()).is_ok());

        let tx = &v1(&envelope).tx;
        assert_eq!(tx.fee, 100);
        assert_eq!(tx.seq_num.0, 99);
        assert!(v1(&envelope).signatures.is_empty());
        assert!(matches!(tx.cond, Preconditions::Time(_)));
        match host_function(&envelope) {
            Some(HostFunction::InvokeContract(args)) => {
                assert_eq!(args.function_name.to_string(), "transfer");
            }
            other => panic!("expected InvokeContract, got {:?}", other),
        }
    }

    #[test]
    fn zero_timeout_has_no_time_bounds() {
        let source = keypair(1).address();
        let envelope = build_transaction(&source, 1, 100, 0, restore_operation()).unwrap();
        assert!(matches!(v1(&envelope).tx.cond, Preconditions::None));
        assert!(host_function(&envelope).is_none());
    }

    #[test]
    fn build_rejects_contract_source() {
        let err = build_transaction(
            "CAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAABSC4",
            1,
            100,
            0,
            restore_operation(),
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::InvalidArgument(_)));
    }

    #[test]
    fn assemble_sets_data_fee_and_auth() {
        let source = keypair(1).address();
        let entry = address_auth_entry(&keypair(2).address(), 1);
        let data = tx_data(true, 50_000);

        let assembled = assemble_transaction(
            invoke_envelope(&source, 42),
            &data,
            std::slice::from_ref(&entry),
            50_000,
            100,
        )
        .unwrap();

        let tx = &v1(&assembled).tx;
        assert_eq!(tx.fee, 50_100);
        match &tx.ext {
            TransactionExt::V1(d) => assert_eq!(d, &data),
            other => panic!("expected V1 ext, got {:?}", other),
        }
        assert_eq!(auth_entries(&assembled), vec![entry]);
    }

    #[test]
    fn assemble_rejects_fee_overflow() {
        let source = keypair(1).address();
        let err = assemble_transaction(
            invoke_envelope(&source, 42),
            &tx_data(false, 0),
            &[],
            u64::from(u32::MAX),
            100,
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::InvalidArgument(_)));

        let max = assemble_transaction(
            invoke_envelope(&source, 42),
            &tx_data(false, 0),
            &[],
            u64::from(u32::MAX - 100),
            100,
        )
        .unwrap();
        assert_eq!(v1(&max).tx.fee, u32::MAX);
    }

    #[test]
    fn replace_auth_on_restore_is_error() {
        let source = keypair(1).address();
        let envelope = build_transaction(&source, 1, 100, 0, restore_operation()).unwrap();
        assert!(replace_auth_entries(envelope, vec![]).is_err());
    }

    #[test]
    fn hash_ignores_signatures_but_not_auth() {
        let source = keypair(1).address();
        let envelope = invoke_envelope(&source, 5);
        let hash = transaction_hash(&envelope, TESTNET_PASSPHRASE).unwrap();

        let sig = DecoratedSignature {
            hint: SignatureHint([1, 2, 3, 4]),
            signature: Signature(vec![0u8; 64].try_into().unwrap()),
        };
        let signed = with_signatures(envelope.clone(), vec![sig]).unwrap();
        assert_eq!(transaction_hash(&signed, TESTNET_PASSPHRASE).unwrap(), hash);

        let with_auth = replace_auth_entries(
            envelope,
            vec![address_auth_entry(&keypair(2).address(), 1)],
        )
        .unwrap();
        assert_ne!(transaction_hash(&with_auth, TESTNET_PASSPHRASE).unwrap(), hash);
    }

    #[test]
    fn hash_depends_on_network() {
        let source = keypair(1).address();
        let envelope = invoke_envelope(&source, 5);
        assert_ne!(
            transaction_hash(&envelope, TESTNET_PASSPHRASE).unwrap(),
            transaction_hash(&envelope, "Standalone Network ; February 2017").unwrap()
        );
    }
}
