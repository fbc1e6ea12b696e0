//! IPFS adapter: Implementation of ContentStore over the Kubo HTTP RPC API.
//!
//! - `put` → `POST /api/v0/add?pin=true` (multipart, one file part)
//! - `get` → `POST /api/v0/cat?arg=<cid>`
//!
//! Uploaded blobs are pinned so the node keeps them.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::domain::ContentId;
use crate::ports::{ContentStore, StoreError};

/// IPFS HTTP API client.
#[derive(Debug, Clone)]
pub struct IpfsContentStore {
    client: reqwest::Client,
    api_url: String,
}

#[derive(Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

impl IpfsContentStore {
    /// Create a client for the node at `api_url` (e.g. `http://localhost:5001`).
    ///
    /// # Errors
    /// Returns `StoreError::Backend` if the HTTP client cannot be built.
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v0/{path}", self.api_url)
    }
}

/// Kubo reports lookups of unknown or invalid paths as 500 with a message body.
fn is_not_found(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::NOT_FOUND {
        return true;
    }
    let body = body.to_ascii_lowercase();
    body.contains("not found") || body.contains("invalid path") || body.contains("invalid cid")
}

impl ContentStore for IpfsContentStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentId, StoreError> {
        let size = bytes.len();
        let form = Form::new().part("file", Part::bytes(bytes).file_name("blob"));

        let response = self
            .client
            .post(self.endpoint("add"))
            .query(&[("pin", "true")])
            .multipart(form)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Unavailable(format!("add returned {status}: {body}")));
        }

        let added: AddResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to parse add response: {e}")))?;

        tracing::debug!("Uploaded {} bytes to IPFS as {}", size, added.hash);
        ContentId::new(added.hash).map_err(StoreError::Backend)
    }

    async fn get(&self, id: &ContentId) -> Result<Vec<u8>, StoreError> {
        let response = self
            .client
            .post(self.endpoint("cat"))
            .query(&[("arg", id.as_str())])
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if is_not_found(status, &body) {
                return Err(StoreError::NotFound(id.to_string()));
            }
            return Err(StoreError::Unavailable(format!("cat returned {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
