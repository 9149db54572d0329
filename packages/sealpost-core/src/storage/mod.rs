//! # Storage Module
//!
//! Content-addressed storage for serialized envelopes.
//!
//! ## Storage Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       CONTENT-ADDRESSED STORAGE                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Sender                                                                │
//! │    put(envelope JSON) ──► ContentId ("Qm…")                            │
//! │                             │                                           │
//! │                             └──► storage key = Hash(cid) ──► ledger     │
//! │                                                                         │
//! │  Recipient                                                             │
//! │    pointer.storage_key ──► resolve() ──► ContentId ──► get() ──► JSON  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The ledger never carries the identifier itself, only its hash. A store
//! therefore has to map a storage lookup key back to an identifier it knows
//! about, which is what [`ContentStore::resolve`] does.
//!
//! ## Implementations
//!
//! | Store | Backing | Identifiers |
//! |-------|---------|-------------|
//! | [`MemoryStore`] | process memory, shareable between sessions | CIDv0 of the content |
//! | [`IpfsStore`] | IPFS HTTP API + gateway | assigned by the node |

mod ipfs;
mod memory;

pub use ipfs::IpfsStore;
pub use memory::MemoryStore;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::discovery::{LookupKey, LookupScheme};
use crate::error::{Error, Result};

/// Opaque storage identifier
///
/// Case-sensitive. Hashed verbatim into a storage lookup key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Wrap an identifier as returned by a store
    pub fn new(cid: impl Into<String>) -> Self {
        Self(cid.into())
    }

    /// Parse user input
    pub fn parse(input: &str) -> Result<Self> {
        let cid = input.trim();
        if cid.is_empty() || cid.chars().any(char::is_whitespace) {
            return Err(Error::InvalidInput(format!(
                "Not a content identifier: {:?}",
                input
            )));
        }
        Ok(Self(cid.to_string()))
    }

    /// Identifier string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content-addressed blob store
///
/// All errors are recoverable: [`Error::StorageUnavailable`] when the store
/// cannot be reached, [`Error::ContentNotFound`] when it has nothing for the
/// identifier or key.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store serialized content, returning its identifier
    async fn put(&self, content: &str) -> Result<ContentId>;

    /// Fetch content by identifier
    async fn get(&self, cid: &ContentId) -> Result<String>;

    /// Map a storage lookup key back to the identifier it was derived from
    async fn resolve(&self, storage_key: &LookupKey) -> Result<ContentId>;

    /// Scheme `resolve` indexes with, if the store derives keys itself
    fn lookup_scheme(&self) -> Option<LookupScheme> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id_parse() {
        let cid = ContentId::parse("  QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG ").unwrap();

        assert_eq!(cid.as_str(), "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG");
        assert!(ContentId::parse("").is_err());
        assert!(ContentId::parse("Qm abc").is_err());
    }

    #[test]
    fn test_content_id_serde_is_plain_string() {
        let cid = ContentId::new("QmAbc");

        assert_eq!(serde_json::to_string(&cid).unwrap(), "\"QmAbc\"");
    }
}
