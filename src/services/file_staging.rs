//! DataFileUtil client reached through the SDK callback server.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{ServiceError, rpc::RpcClient};

#[derive(Serialize)]
struct ShockToFileParams<'a> {
    shock_id: &'a str,
    file_path: &'a str,
    unpack: &'static str,
}

/// What DataFileUtil reports after materializing a node locally.
#[derive(Debug, Clone, Deserialize)]
pub struct ShockToFileOutput {
    #[serde(default)]
    pub node_file_name: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct FileStagingClient {
    rpc: RpcClient,
}

impl FileStagingClient {
    pub fn new(callback_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            rpc: RpcClient::new(callback_url, Some(token.into())),
        }
    }

    /// Download `shock_id` to `file_path` and unpack the archive beside it.
    ///
    /// The path must be visible to the callback server, i.e. under the shared
    /// scratch directory.
    pub fn shock_to_file_unpacked(
        &self,
        shock_id: &str,
        file_path: &Path,
    ) -> Result<ShockToFileOutput, ServiceError> {
        let file_path = file_path.to_string_lossy();
        let params = ShockToFileParams {
            shock_id,
            file_path: &file_path,
            unpack: "unpack",
        };
        let (output,): (ShockToFileOutput,) =
            self.rpc.call("DataFileUtil.shock_to_file", &(params,))?;
        Ok(output)
    }
}
