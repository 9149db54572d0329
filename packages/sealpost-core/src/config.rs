//! # Configuration
//!
//! Settings for a Sealpost deployment, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) gives a
//! simulated session on the demo directory. The defaults for the live
//! backends point at Sepolia and the public dweb.link IPFS endpoints.
//!
//! ```toml
//! mode = "live"
//! lookup_scheme = "legacy"
//!
//! [network]
//! rpc_url = "http://127.0.0.1:8545"
//! contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
//!
//! [sync]
//! look_back_blocks = 10000
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::LookupScheme;
use crate::error::{Error, Result};
use crate::identity::{Address, Directory, DirectoryEntry};

/// Sepolia testnet chain id
pub const DEFAULT_CHAIN_ID: u64 = 11_155_111;

/// Blocks searched for historical pointers
pub const DEFAULT_LOOK_BACK_BLOCKS: u64 = 10_000;

/// Interval between live ledger polls
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 4_000;

/// How long to wait for a transaction to be mined
pub const DEFAULT_RECEIPT_TIMEOUT_SECS: u64 = 120;

/// Which collaborators a session talks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// In-memory ledger and store, nothing leaves the process
    #[default]
    Simulated,
    /// Ethereum JSON-RPC ledger and IPFS store
    Live,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Simulated => f.write_str("simulated"),
            Mode::Live => f.write_str("live"),
        }
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "simulated" | "mock" => Ok(Mode::Simulated),
            "live" => Ok(Mode::Live),
            other => Err(Error::Config(format!("Unknown mode: {}", other))),
        }
    }
}

/// Ledger connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Expected chain id
    pub chain_id: u64,
    /// Human-readable network name
    pub network_name: String,
    /// JSON-RPC endpoint
    pub rpc_url: String,
    /// Address of the pointer contract
    pub contract_address: Address,
    /// Seconds to wait for a submission to be mined
    pub receipt_timeout_secs: u64,
}

impl NetworkConfig {
    /// Receipt timeout as a `Duration`
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            network_name: "Sepolia".to_string(),
            rpc_url: "https://eth-sepolia.g.alchemy.com/v2/demo".to_string(),
            contract_address: Address("0x0000000000000000000000000000000000000000".to_string()),
            receipt_timeout_secs: DEFAULT_RECEIPT_TIMEOUT_SECS,
        }
    }
}

/// IPFS endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpfsConfig {
    /// HTTP API base (`/add`, `/pin/ls`)
    pub api_url: String,
    /// Gateway base for content reads
    pub gateway_url: String,
}

impl Default for IpfsConfig {
    fn default() -> Self {
        Self {
            api_url: "https://dweb.link/api/v0".to_string(),
            gateway_url: "https://dweb.link/ipfs/".to_string(),
        }
    }
}

/// Inbox synchronization settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How far back catch-up searches
    pub look_back_blocks: u64,
    /// Interval between live ledger polls (live mode)
    pub poll_interval_ms: u64,
}

impl SyncConfig {
    /// Poll interval as a `Duration`
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            look_back_blocks: DEFAULT_LOOK_BACK_BLOCKS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SealpostConfig {
    /// Collaborator selection
    pub mode: Mode,
    /// Lookup key derivation, shared by every party of a deployment
    pub lookup_scheme: LookupScheme,
    /// Ledger settings
    pub network: NetworkConfig,
    /// IPFS settings
    pub ipfs: IpfsConfig,
    /// Synchronizer settings
    pub sync: SyncConfig,
    /// Known parties
    pub directory: Vec<DirectoryEntry>,
}

impl Default for SealpostConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            lookup_scheme: LookupScheme::default(),
            network: NetworkConfig::default(),
            ipfs: IpfsConfig::default(),
            sync: SyncConfig::default(),
            directory: Directory::demo().entries().to_vec(),
        }
    }
}

impl SealpostConfig {
    /// Parse a TOML document
    pub fn from_toml(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;

        let config = Self::from_toml(&source)?;
        tracing::info!(path = %path.display(), mode = %config.mode, "Loaded configuration");
        Ok(config)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.network.contract_address.evm_bytes().is_none() {
            return Err(Error::Config(format!(
                "contract_address must be an EVM address, got {}",
                self.network.contract_address
            )));
        }
        if self.network.rpc_url.trim().is_empty() {
            return Err(Error::Config("rpc_url must not be empty".into()));
        }
        if self.ipfs.api_url.trim().is_empty() || self.ipfs.gateway_url.trim().is_empty() {
            return Err(Error::Config("IPFS endpoints must not be empty".into()));
        }
        Ok(())
    }

    /// The configured address book
    pub fn directory(&self) -> Directory {
        Directory::new(self.directory.clone())
    }
}
