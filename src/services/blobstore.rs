//! Shock blob-store client: node metadata, downloads and deletion.

use std::{fs::File, path::Path};

use serde::Deserialize;
use url::Url;

use crate::http_client;

use super::{ServiceError, map_ureq_error};

const MAX_NODE_RESPONSE_BYTES: usize = 1024 * 1024;
const MAX_DOWNLOAD_BYTES: usize = 2 * 1024 * 1024 * 1024;

/// Node record as returned by `GET /node/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShockNode {
    pub id: String,
    pub file: NodeFile,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeFile {
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub checksum: NodeChecksum,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NodeChecksum {
    #[serde(default)]
    pub md5: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShockEnvelope<T> {
    data: Option<T>,
    #[serde(default)]
    error: Option<Vec<String>>,
}

/// Client for one Shock instance, authenticated with an OAuth header.
#[derive(Debug, Clone)]
pub struct BlobStoreClient {
    base_url: String,
    token: String,
}

impl BlobStoreClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    /// Base URL exactly as configured; handles must carry the same string.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the node record for `id`.
    pub fn get_node(&self, id: &str) -> Result<ShockNode, ServiceError> {
        let url = self.node_url(id)?;
        let response = http_client::agent()
            .get(url.as_str())
            .set("Authorization", &self.auth_header())
            .call()
            .map_err(|err| map_ureq_error(url.as_str(), err))?;
        let body = http_client::read_response_text(response, MAX_NODE_RESPONSE_BYTES)?;
        let envelope: ShockEnvelope<ShockNode> =
            serde_json::from_str(body.trim()).map_err(|err| ServiceError::InvalidResponse {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        envelope.data.ok_or_else(|| ServiceError::InvalidResponse {
            url: url.to_string(),
            message: envelope
                .error
                .map(|errors| errors.join("; "))
                .unwrap_or_else(|| "node response has no data".to_string()),
        })
    }

    /// Stream the node's file to `dest`, returning the number of bytes written.
    pub fn download_node(&self, id: &str, dest: &Path) -> Result<u64, ServiceError> {
        let mut url = self.node_url(id)?;
        url.set_query(Some("download"));
        let response = http_client::agent()
            .get(url.as_str())
            .set("Authorization", &self.auth_header())
            .call()
            .map_err(|err| map_ureq_error(url.as_str(), err))?;
        let mut file = File::create(dest)?;
        let written =
            http_client::copy_response_to_writer(response, &mut file, MAX_DOWNLOAD_BYTES)?;
        tracing::debug!(node = id, bytes = written, dest = %dest.display(), "Downloaded node");
        Ok(written)
    }

    /// Delete the node. A node that is already gone yields a 404 [`ServiceError::Status`].
    pub fn delete_node(&self, id: &str) -> Result<(), ServiceError> {
        let url = self.node_url(id)?;
        http_client::agent()
            .delete(url.as_str())
            .set("Authorization", &self.auth_header())
            .call()
            .map_err(|err| map_ureq_error(url.as_str(), err))?;
        Ok(())
    }

    fn auth_header(&self) -> String {
        format!("OAuth {}", self.token)
    }

    fn node_url(&self, id: &str) -> Result<Url, ServiceError> {
        let invalid = |message: String| ServiceError::InvalidResponse {
            url: self.base_url.clone(),
            message,
        };
        if id.trim().is_empty() || id.contains('/') {
            return Err(invalid(format!("Invalid node id '{id}'")));
        }
        let mut url = Url::parse(&self.base_url).map_err(|err| invalid(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("Base URL cannot hold a path".to_string()))?
            .pop_if_empty()
            .push("node")
            .push(id);
        Ok(url)
    }
}
