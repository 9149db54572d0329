//! In-process content store.
//!
//! Identifiers are CIDv0-shaped: base58 of the sha2-256 multihash of the
//! content, so they start with `Qm` like the ones an IPFS node hands out.
//! Identical content gets the identical identifier.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::discovery::{LookupKey, LookupScheme};
use crate::error::{Error, Result};

use super::{ContentId, ContentStore};

/// Multihash prefix: sha2-256, 32-byte digest
const MULTIHASH_SHA2_256: [u8; 2] = [0x12, 0x20];

#[derive(Default)]
struct Inner {
    blobs: HashMap<ContentId, String>,
    index: HashMap<LookupKey, ContentId>,
}

/// Content store held in memory
///
/// Share one instance (behind an `Arc`) between the sessions of a
/// simulation so they see each other's content.
#[derive(Default)]
pub struct MemoryStore {
    scheme: LookupScheme,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store using the default lookup scheme
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store indexing with `scheme`
    pub fn with_scheme(scheme: LookupScheme) -> Self {
        Self {
            scheme,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// CIDv0 for a piece of content
    pub fn content_id_for(content: &str) -> ContentId {
        let digest = Sha256::digest(content.as_bytes());
        let mut multihash = Vec::with_capacity(MULTIHASH_SHA2_256.len() + digest.len());
        multihash.extend_from_slice(&MULTIHASH_SHA2_256);
        multihash.extend_from_slice(&digest);
        ContentId::new(bs58::encode(multihash).into_string())
    }

    /// Drop content, as if it had been garbage collected
    pub fn remove(&self, cid: &ContentId) -> bool {
        self.inner.lock().blobs.remove(cid).is_some()
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.inner.lock().blobs.len()
    }

    /// Whether the store holds nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn put(&self, content: &str) -> Result<ContentId> {
        let cid = Self::content_id_for(content);
        let key = self.scheme.storage_key(&cid);

        let mut inner = self.inner.lock();
        inner.blobs.insert(cid.clone(), content.to_string());
        inner.index.insert(key, cid.clone());

        tracing::debug!(cid = %cid, bytes = content.len(), "Stored content in memory");
        Ok(cid)
    }

    async fn get(&self, cid: &ContentId) -> Result<String> {
        self.inner
            .lock()
            .blobs
            .get(cid)
            .cloned()
            .ok_or_else(|| Error::ContentNotFound(cid.to_string()))
    }

    async fn resolve(&self, storage_key: &LookupKey) -> Result<ContentId> {
        self.inner
            .lock()
            .index
            .get(storage_key)
            .cloned()
            .ok_or_else(|| Error::ContentNotFound(storage_key.to_hex()))
    }

    fn lookup_scheme(&self) -> Option<LookupScheme> {
        Some(self.scheme)
    }
}
