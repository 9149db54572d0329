//! # Discovery Module
//!
//! Recipient discovery through hashed lookup keys.
//!
//! ## How a Recipient Finds Its Mail
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        LOOKUP KEY DERIVATION                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Sender                                                                │
//! │  ──────                                                                 │
//! │  recipient address ──► canonical (lower-case) ──► SHA-512[..32]        │
//! │                                                    = recipient key     │
//! │  storage CID (verbatim) ─────────────────────────► SHA-512[..32]       │
//! │                                                    = storage key       │
//! │                                                                         │
//! │  Pointer on ledger: { sender, recipient key, storage key, timestamp }  │
//! │                                                                         │
//! │  Recipient                                                             │
//! │  ─────────                                                              │
//! │  own address ──► same derivation ──► filter pointers by recipient key  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Privacy
//!
//! The hash only keeps the plaintext address off the ledger. Anyone holding
//! a list of candidate addresses can hash them and link pointers to parties.
//!
//! ## Schemes
//!
//! | Scheme | Recipient input | Storage input |
//! |--------|-----------------|---------------|
//! | `legacy` (default) | `address` | `cid` |
//! | `domain_separated` | `"sealpost:recipient:" + address` | `"sealpost:storage:" + cid` |
//!
//! Every party of a deployment must use the same scheme, otherwise pointers
//! are never matched.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::error::{Error, Result};
use crate::identity::Address;
use crate::storage::ContentId;

/// Size of a lookup key in bytes (one EVM `bytes32` word)
pub const LOOKUP_KEY_SIZE: usize = 32;

/// Prefixes for [`LookupScheme::DomainSeparated`]
pub mod domain {
    /// Prefix for recipient identities
    pub const RECIPIENT: &str = "sealpost:recipient:";
    /// Prefix for storage identifiers
    pub const STORAGE: &str = "sealpost:storage:";
}

/// One-way hash of an identity or storage identifier
///
/// Displayed as `0x` followed by 64 lower-case hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LookupKey([u8; LOOKUP_KEY_SIZE]);

impl LookupKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; LOOKUP_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; LOOKUP_KEY_SIZE] {
        &self.0
    }

    /// `0x`-prefixed lower-case hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse hex, with or without the `0x` prefix
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if body.len() != LOOKUP_KEY_SIZE * 2 {
            return Err(Error::InvalidInput(format!(
                "Lookup key must be {} hex characters",
                LOOKUP_KEY_SIZE * 2
            )));
        }

        let bytes = hex::decode(body)
            .map_err(|e| Error::InvalidInput(format!("Invalid lookup key hex: {}", e)))?;
        let bytes: [u8; LOOKUP_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::InvalidInput("Invalid lookup key length".into()))?;

        Ok(Self(bytes))
    }
}

impl fmt::Debug for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LookupKey({})", self.to_hex())
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for LookupKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LookupKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<LookupKey> for String {
    fn from(key: LookupKey) -> Self {
        key.to_hex()
    }
}

/// Hash text into a lookup key
///
/// The first 32 bytes of SHA-512 over the UTF-8 bytes. Callers canonicalize
/// identities before hashing; this function hashes exactly what it is given.
pub fn derive_lookup_key(text: &str) -> LookupKey {
    let digest = Sha512::digest(text.as_bytes());
    let mut key = [0u8; LOOKUP_KEY_SIZE];
    key.copy_from_slice(&digest[..LOOKUP_KEY_SIZE]);
    LookupKey(key)
}

/// How identities and storage identifiers are turned into lookup keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupScheme {
    /// Plain truncated SHA-512, compatible with deployed pointers
    #[default]
    Legacy,
    /// Inputs prefixed per purpose so the two key kinds never collide
    DomainSeparated,
}

impl LookupScheme {
    /// Lookup key under which a recipient's pointers are published
    pub fn recipient_key(&self, address: &Address) -> LookupKey {
        match self {
            LookupScheme::Legacy => derive_lookup_key(address.as_str()),
            LookupScheme::DomainSeparated => {
                derive_lookup_key(&format!("{}{}", domain::RECIPIENT, address))
            }
        }
    }

    /// Lookup key that stands in for a storage identifier on the ledger
    pub fn storage_key(&self, cid: &ContentId) -> LookupKey {
        match self {
            LookupScheme::Legacy => derive_lookup_key(cid.as_str()),
            LookupScheme::DomainSeparated => {
                derive_lookup_key(&format!("{}{}", domain::STORAGE, cid))
            }
        }
    }
}

impl fmt::Display for LookupScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupScheme::Legacy => f.write_str("legacy"),
            LookupScheme::DomainSeparated => f.write_str("domain_separated"),
        }
    }
}

impl FromStr for LookupScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "legacy" => Ok(LookupScheme::Legacy),
            "domain_separated" => Ok(LookupScheme::DomainSeparated),
            other => Err(Error::Config(format!("Unknown lookup scheme: {}", other))),
        }
    }
}
