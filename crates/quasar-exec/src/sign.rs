//! Signers: ed25519 keypairs, envelope signatures and auth-entry signatures.

use std::fmt;

use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};
use stellar_strkey::Strkey;
use stellar_xdr::curr::{
    DecoratedSignature, Hash, HashIdPreimage, HashIdPreimageSorobanAuthorization, Limits, ScBytes,
    ScMap, ScMapEntry, ScVal, ScVec, Signature, SignatureHint, SorobanAuthorizationEntry,
    SorobanCredentials, WriteXdr,
};

use quasar_compile::{account_strkey, encode_address, to_symbol};

use crate::error::SignError;

/// Something that can produce ed25519 signatures for one Stellar address.
///
/// Implement this for hardware wallets or remote signers; `Keypair` is the
/// in-process implementation.
pub trait TransactionSigner: Send + Sync {
    /// Raw ed25519 public key.
    fn public_key(&self) -> [u8; 32];

    /// G... address of the key.
    fn address(&self) -> String {
        account_strkey(&self.public_key())
    }

    /// Sign a 32-byte payload (transaction hash or auth preimage hash).
    fn sign(&self, payload: &[u8; 32]) -> Result<[u8; 64], SignError>;
}

/// An in-memory ed25519 keypair.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Decode an `S...` secret key.
    pub fn from_secret(secret: &str) -> Result<Self, SignError> {
        Ok(Self {
            signing_key: decode_secret_key(secret)?,
        })
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }
}

// Never print key material.
impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address())
            .finish()
    }
}

impl TransactionSigner for Keypair {
    fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    fn sign(&self, payload: &[u8; 32]) -> Result<[u8; 64], SignError> {
        Ok(self.signing_key.sign(payload).to_bytes())
    }
}

/// Decode a Stellar secret key (`S...` format) into an ed25519 `SigningKey`.
pub fn decode_secret_key(secret: &str) -> Result<SigningKey, SignError> {
    match Strkey::from_string(secret) {
        Ok(Strkey::PrivateKeyEd25519(sk)) => Ok(SigningKey::from_bytes(&sk.0)),
        Ok(_) => Err(SignError::InvalidSecretKey(
            "expected S... secret key, got different key type".into(),
        )),
        Err(e) => Err(SignError::InvalidSecretKey(format!(
            "invalid secret key format: {}",
            e
        ))),
    }
}

/// Hint: last 4 bytes of the public key.
pub fn signature_hint(public_key: &[u8; 32]) -> SignatureHint {
    SignatureHint([public_key[28], public_key[29], public_key[30], public_key[31]])
}

/// Sign a transaction hash and wrap it as an envelope `DecoratedSignature`.
pub fn decorated_signature(
    signer: &dyn TransactionSigner,
    tx_hash: &[u8; 32],
) -> Result<DecoratedSignature, SignError> {
    let signature = signer.sign(tx_hash)?;
    Ok(DecoratedSignature {
        hint: signature_hint(&signer.public_key()),
        signature: Signature(
            signature
                .to_vec()
                .try_into()
                .map_err(|e| SignError::Failed(format!("signature: {}", e)))?,
        ),
    })
}

/// Address an auth entry must be signed by; `None` for source-account credentials.
pub fn auth_entry_address(entry: &SorobanAuthorizationEntry) -> Option<String> {
    match &entry.credentials {
        SorobanCredentials::Address(creds) => encode_address(&creds.address).ok(),
        _ => None,
    }
}

/// Source-account credentials are covered by the envelope signature.
pub fn auth_entry_is_signed(entry: &SorobanAuthorizationEntry) -> bool {
    match &entry.credentials {
        SorobanCredentials::Address(creds) => !matches!(creds.signature, ScVal::Void),
        _ => true,
    }
}

/// `SHA256(HashIdPreimage::SorobanAuthorization)` for an entry.
pub fn auth_payload(
    entry: &SorobanAuthorizationEntry,
    network_id: &[u8; 32],
    expiration_ledger: u32,
) -> Result<[u8; 32], SignError> {
    let SorobanCredentials::Address(creds) = &entry.credentials else {
        return Err(SignError::Failed(
            "source-account credentials carry no signature".into(),
        ));
    };

    let preimage = HashIdPreimage::SorobanAuthorization(HashIdPreimageSorobanAuthorization {
        network_id: Hash(*network_id),
        nonce: creds.nonce,
        signature_expiration_ledger: expiration_ledger,
        invocation: entry.root_invocation.clone(),
    });
    let bytes = preimage
        .to_xdr(Limits::none())
        .map_err(|e| SignError::Failed(format!("auth preimage: {}", e)))?;
    Ok(Sha256::digest(bytes).into())
}

/// Sign an address-credential auth entry valid until `expiration_ledger`.
///
/// The signature is stored as `Vec[Map{public_key: Bytes, signature: Bytes}]`,
/// the shape the Stellar account contract verifies.
pub fn sign_auth_entry(
    entry: &SorobanAuthorizationEntry,
    signer: &dyn TransactionSigner,
    network_id: &[u8; 32],
    expiration_ledger: u32,
) -> Result<SorobanAuthorizationEntry, SignError> {
    let address = auth_entry_address(entry).ok_or_else(|| {
        SignError::Failed("source-account credentials carry no signature".into())
    })?;
    if address != signer.address() {
        return Err(SignError::WrongSigner {
            signer: signer.address(),
            address,
        });
    }

    let payload = auth_payload(entry, network_id, expiration_ledger)?;
    let signature = signer.sign(&payload)?;

    let bytes = |raw: &[u8]| -> Result<ScVal, SignError> {
        let b: ScBytes = raw
            .to_vec()
            .try_into()
            .map_err(|e| SignError::Failed(format!("bytes: {}", e)))?;
        Ok(ScVal::Bytes(b))
    };
    let symbol = |s: &str| -> Result<ScVal, SignError> {
        to_symbol(s)
            .map(ScVal::Symbol)
            .map_err(|e| SignError::Failed(e.to_string()))
    };

    let map = ScMap(
        vec![
            ScMapEntry {
                key: symbol("public_key")?,
                val: bytes(&signer.public_key())?,
            },
            ScMapEntry {
                key: symbol("signature")?,
                val: bytes(&signature)?,
            },
        ]
        .try_into()
        .map_err(|e| SignError::Failed(format!("signature map: {}", e)))?,
    );
    let sig_vec = ScVec(
        vec![ScVal::Map(Some(map))]
            .try_into()
            .map_err(|e| SignError::Failed(format!("signature vec: {}", e)))?,
    );

    let mut signed = entry.clone();
    if let SorobanCredentials::Address(creds) = &mut signed.credentials {
        creds.signature_expiration_ledger = expiration_ledger;
        creds.signature = ScVal::Vec(Some(sig_vec));
    }
    Ok(signed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
