//! IPFS content store over the HTTP API.
//!
//! ```text
//! put      POST {api}/add?pin=true         multipart "file"  → {"Hash": cid}
//! get      GET  {gateway}/{cid}                              → content
//! resolve  local index, then POST {api}/pin/ls?type=recursive → {"Keys": {cid: …}}
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{multipart, Client, StatusCode};
use serde::Deserialize;

use crate::discovery::{LookupKey, LookupScheme};
use crate::error::{Error, Result};

use super::{ContentId, ContentStore};

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

#[derive(Debug, Deserialize)]
struct PinLsResponse {
    #[serde(rename = "Keys", default)]
    keys: HashMap<String, serde_json::Value>,
}

/// Content store backed by an IPFS node
pub struct IpfsStore {
    client: Client,
    api_url: String,
    gateway_url: String,
    scheme: LookupScheme,
    /// Storage keys of identifiers this store has put or listed
    index: Mutex<HashMap<LookupKey, ContentId>>,
}

impl IpfsStore {
    /// Create a store for an API endpoint and a gateway
    pub fn new(
        api_url: impl Into<String>,
        gateway_url: impl Into<String>,
        scheme: LookupScheme,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            gateway_url: gateway_url.into().trim_end_matches('/').to_string(),
            scheme,
            index: Mutex::new(HashMap::new()),
        })
    }

    fn content_url(&self, cid: &ContentId) -> String {
        format!("{}/{}", self.gateway_url, cid)
    }

    fn remember(&self, cid: &ContentId) {
        let key = self.scheme.storage_key(cid);
        self.index.lock().insert(key, cid.clone());
    }

    /// Reload the index from the node's recursive pins
    async fn refresh_index(&self) -> Result<usize> {
        let response = self
            .client
            .post(format!("{}/pin/ls", self.api_url))
            .query(&[("type", "recursive")])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::StorageUnavailable(format!("IPFS pin/ls failed: {}", e)))?;

        let body: PinLsResponse = response
            .json()
            .await
            .map_err(|e| Error::StorageUnavailable(format!("Unexpected pin/ls response: {}", e)))?;

        let count = body.keys.len();
        for cid in body.keys.into_keys() {
            self.remember(&ContentId::new(cid));
        }

        tracing::debug!(pins = count, "Refreshed IPFS pin index");
        Ok(count)
    }
}

#[async_trait]
impl ContentStore for IpfsStore {
    async fn put(&self, content: &str) -> Result<ContentId> {
        let part = multipart::Part::text(content.to_string())
            .file_name("envelope.json")
            .mime_str("application/json")
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/add", self.api_url))
            .query(&[("pin", "true")])
            .multipart(form)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::StorageUnavailable(format!("IPFS add failed: {}", e)))?;

        let added: AddResponse = response
            .json()
            .await
            .map_err(|e| Error::StorageUnavailable(format!("Unexpected add response: {}", e)))?;

        let cid = ContentId::parse(&added.hash)
            .map_err(|_| Error::StorageUnavailable("IPFS returned an empty hash".into()))?;
        self.remember(&cid);

        tracing::info!(cid = %cid, bytes = content.len(), "Uploaded envelope to IPFS");
        Ok(cid)
    }

    async fn get(&self, cid: &ContentId) -> Result<String> {
        let response = self
            .client
            .get(self.content_url(cid))
            .send()
            .await
            .map_err(|e| Error::StorageUnavailable(format!("IPFS gateway unreachable: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::ContentNotFound(cid.to_string()));
        }

        let response = response
            .error_for_status()
            .map_err(|e| Error::StorageUnavailable(format!("IPFS gateway error: {}", e)))?;

        response
            .text()
            .await
            .map_err(|e| Error::StorageUnavailable(format!("Failed to read content: {}", e)))
    }

    async fn resolve(&self, storage_key: &LookupKey) -> Result<ContentId> {
        let cached = self.index.lock().get(storage_key).cloned();
        if let Some(cid) = cached {
            return Ok(cid);
        }

        self.refresh_index().await?;

        self.index
            .lock()
            .get(storage_key)
            .cloned()
            .ok_or_else(|| Error::ContentNotFound(storage_key.to_hex()))
    }

    fn lookup_scheme(&self) -> Option<LookupScheme> {
        Some(self.scheme)
    }
}
