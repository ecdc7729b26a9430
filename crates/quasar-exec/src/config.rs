//! Network presets and client options.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const TESTNET_PASSPHRASE: &str = "Test SDF Network ; September 2015";
pub const FUTURENET_PASSPHRASE: &str = "Test SDF Future Network ; October 2022";
pub const MAINNET_PASSPHRASE: &str = "Public Global Stellar Network ; September 2015";

/// Environment variable consulted when no RPC URL is passed explicitly.
pub const RPC_URL_ENV: &str = "QUASAR_RPC_URL";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no default RPC URL for network '{0}'; pass one explicitly or set QUASAR_RPC_URL")]
    UnknownNetwork(String),
}

/// A Stellar network: passphrase plus the RPC endpoint used to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub passphrase: String,
    pub rpc_url: String,
}

impl Network {
    pub fn testnet() -> Self {
        Self::custom(TESTNET_PASSPHRASE, "https://soroban-testnet.stellar.org")
    }

    pub fn futurenet() -> Self {
        Self::custom(FUTURENET_PASSPHRASE, "https://rpc-futurenet.stellar.org")
    }

    pub fn mainnet() -> Self {
        Self::custom(
            MAINNET_PASSPHRASE,
            "https://soroban-rpc.mainnet.stellar.gateway.fm",
        )
    }

    pub fn custom(passphrase: impl Into<String>, rpc_url: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
            rpc_url: rpc_url.into(),
        }
    }

    /// Resolve a named network, applying the explicit/env RPC URL override.
    pub fn from_name(name: &str, explicit_rpc_url: Option<&str>) -> Result<Self, ConfigError> {
        let passphrase = match name {
            "testnet" => TESTNET_PASSPHRASE,
            "futurenet" => FUTURENET_PASSPHRASE,
            "mainnet" => MAINNET_PASSPHRASE,
            other => return Err(ConfigError::UnknownNetwork(other.to_string())),
        };
        Ok(Self::custom(passphrase, resolve_rpc_url(explicit_rpc_url, name)?))
    }

    /// Network ID: `SHA256(passphrase)`.
    pub fn network_id(&self) -> [u8; 32] {
        Sha256::digest(self.passphrase.as_bytes()).into()
    }
}

/// Resolve the RPC URL from an explicit value, the env var, or the network default.
pub fn resolve_rpc_url(explicit: Option<&str>, network: &str) -> Result<String, ConfigError> {
    if let Some(url) = explicit {
        return Ok(url.to_string());
    }

    if let Ok(url) = std::env::var(RPC_URL_ENV) {
        if !url.is_empty() {
            return Ok(url);
        }
    }

    match network {
        "testnet" => Ok(Network::testnet().rpc_url),
        "mainnet" => Ok(Network::mainnet().rpc_url),
        "futurenet" => Ok(Network::futurenet().rpc_url),
        other => Err(ConfigError::UnknownNetwork(other.to_string())),
    }
}

/// Tunables for building, polling and signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Inclusion fee in stroops, added to the simulated resource fee
    pub base_fee: u32,
    /// Upper time bound of built transactions, in seconds from build time (0 = none)
    pub timeout_seconds: u64,
    /// Fixed delay between status polls
    pub poll_interval_ms: u64,
    /// Wall-clock budget for polling one submission
    pub poll_timeout_ms: u64,
    /// How many ledgers past simulation an auth-entry signature stays valid
    pub auth_validity_ledgers: u32,
    /// Restore archived state automatically during `invoke`
    pub auto_restore: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_fee: 100,
            timeout_seconds: 300,
            poll_interval_ms: 1000,
            poll_timeout_ms: 300_000,
            auth_validity_ledgers: 100,
            auto_restore: true,
        }
    }
}

impl ClientOptions {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn with_base_fee(mut self, fee: u32) -> Self {
        self.base_fee = fee;
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_poll(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.poll_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_auto_restore(mut self, enabled: bool) -> Self {
        self.auto_restore = enabled;
        self
    }
}
