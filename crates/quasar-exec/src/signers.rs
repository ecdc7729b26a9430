//! Who must sign, and who already has.

use std::collections::{BTreeMap, BTreeSet};

use stellar_xdr::curr::{DecoratedSignature, SorobanAuthorizationEntry};

use crate::sign::auth_entry_address;

/// The set of addresses whose signatures a transaction needs.
///
/// `discovered` addresses authorize through their own auth entry. The source
/// and any expected co-signer sign the envelope; a source that also has
/// address-credential entries must do both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignerRequirement {
    pub source: String,
    pub expected: BTreeSet<String>,
    pub discovered: BTreeSet<String>,
}

impl SignerRequirement {
    /// Union of source, expected and discovered addresses.
    pub fn all(&self) -> BTreeSet<String> {
        let mut all = self.expected.clone();
        all.extend(self.discovered.iter().cloned());
        all.insert(self.source.clone());
        all
    }

    pub fn contains(&self, address: &str) -> bool {
        self.source == address
            || self.expected.contains(address)
            || self.discovered.contains(address)
    }

    pub fn signs_auth(&self, address: &str) -> bool {
        self.discovered.contains(address)
    }

    pub fn signs_envelope(&self, address: &str) -> bool {
        self.source == address || !self.discovered.contains(address)
    }
}

/// Derives signer requirements from simulation output.
pub struct SignerResolver;

impl SignerResolver {
    /// Addresses with address credentials in `auth`, the source included.
    ///
    /// Source-account credentials are covered by the envelope signature and
    /// name no address.
    pub fn discover(auth: &[SorobanAuthorizationEntry]) -> BTreeSet<String> {
        auth.iter().filter_map(auth_entry_address).collect()
    }

    pub fn requirement(
        source: &str,
        expected: &BTreeSet<String>,
        auth: &[SorobanAuthorizationEntry],
    ) -> SignerRequirement {
        SignerRequirement {
            source: source.to_string(),
            expected: expected.clone(),
            discovered: Self::discover(auth),
        }
    }
}

/// Signatures collected so far.
///
/// Envelope signatures are bound to the transaction hash they cover; recording
/// one against a different hash drops the stale ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureSet {
    auth: BTreeSet<String>,
    envelope: BTreeMap<String, DecoratedSignature>,
    signed_hash: Option<[u8; 32]>,
}

impl SignatureSet {
    pub fn record_auth(&mut self, address: &str) -> bool {
        self.auth.insert(address.to_string())
    }

    /// Returns `false` when `address` already signed this hash.
    pub fn record_envelope(
        &mut self,
        address: &str,
        signature: DecoratedSignature,
        tx_hash: [u8; 32],
    ) -> bool {
        if self.signed_hash != Some(tx_hash) {
            self.envelope.clear();
            self.signed_hash = Some(tx_hash);
        }
        if self.envelope.contains_key(address) {
            return false;
        }
        self.envelope.insert(address.to_string(), signature);
        true
    }

    pub fn has_auth(&self, address: &str) -> bool {
        self.auth.contains(address)
    }

    pub fn has_envelope(&self, address: &str) -> bool {
        self.envelope.contains_key(address)
    }

    pub fn signed_hash(&self) -> Option<[u8; 32]> {
        self.signed_hash
    }

    /// Drop envelope signatures; the transaction hash they covered is gone.
    pub fn invalidate_envelope(&mut self) {
        self.envelope.clear();
        self.signed_hash = None;
    }

    pub fn clear(&mut self) {
        self.auth.clear();
        self.invalidate_envelope();
    }

    pub fn is_empty(&self) -> bool {
        self.auth.is_empty() && self.envelope.is_empty()
    }

    pub fn is_satisfied(&self, address: &str, requirement: &SignerRequirement) -> bool {
        (!requirement.signs_auth(address) || self.has_auth(address))
            && (!requirement.signs_envelope(address) || self.has_envelope(address))
    }

    /// Required addresses without a signature, sorted.
    pub fn missing(&self, requirement: &SignerRequirement) -> Vec<String> {
        requirement
            .all()
            .into_iter()
            .filter(|address| !self.is_satisfied(address, requirement))
            .collect()
    }

    /// Envelope signatures in address order.
    pub fn envelope_signatures(&self) -> Vec<DecoratedSignature> {
        self.envelope.values().cloned().collect()
    }
}
