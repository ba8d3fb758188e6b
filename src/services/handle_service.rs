//! Handle service client (`AbstractHandle` JSON-RPC API).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ServiceError, rpc::RpcClient};

/// Indirection record binding a Shock node to descriptive metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handle {
    pub hid: String,
    pub id: String,
    pub url: String,
    pub file_name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub remote_md5: String,
    /// Fields not compared here (`remote_sha1`, `created_by`, ...), sent back unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct HandleServiceClient {
    rpc: RpcClient,
}

impl HandleServiceClient {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            rpc: RpcClient::new(url, Some(token.into())),
        }
    }

    /// Resolve handle ids to their records, in the service's order.
    pub fn hids_to_handles(&self, hids: &[String]) -> Result<Vec<Handle>, ServiceError> {
        let (handles,): (Vec<Handle>,) =
            self.rpc.call("AbstractHandle.hids_to_handles", &(hids,))?;
        Ok(handles)
    }

    /// Delete the given handle records.
    pub fn delete_handles(&self, handles: &[Handle]) -> Result<(), ServiceError> {
        if handles.is_empty() {
            return Ok(());
        }
        self.rpc
            .call_unit("AbstractHandle.delete_handles", &(handles,))
    }
}
