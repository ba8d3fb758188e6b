//! Workspace service client, limited to creating and deleting a scratch workspace.

use serde::Serialize;
use serde_json::Value;

use super::{ServiceError, rpc::RpcClient};

/// The parts of the workspace info tuple the harness uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceInfo {
    pub id: u64,
    pub name: String,
}

impl WorkspaceInfo {
    /// Decode the `[id, name, owner, ...]` info tuple.
    fn from_tuple(tuple: &[Value]) -> Option<Self> {
        let id = tuple.first()?.as_u64()?;
        let name = tuple.get(1)?.as_str()?.to_string();
        Some(Self { id, name })
    }
}

#[derive(Serialize)]
struct CreateWorkspaceParams<'a> {
    workspace: &'a str,
}

#[derive(Serialize)]
struct WorkspaceIdentity {
    id: u64,
}

#[derive(Debug, Clone)]
pub struct WorkspaceClient {
    rpc: RpcClient,
}

impl WorkspaceClient {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            rpc: RpcClient::new(url, Some(token.into())),
        }
    }

    pub fn create_workspace(&self, name: &str) -> Result<WorkspaceInfo, ServiceError> {
        let (tuple,): (Vec<Value>,) = self.rpc.call(
            "Workspace.create_workspace",
            &(CreateWorkspaceParams { workspace: name },),
        )?;
        WorkspaceInfo::from_tuple(&tuple).ok_or_else(|| ServiceError::InvalidResponse {
            url: self.rpc.url().to_string(),
            message: format!("Unexpected workspace info: {tuple:?}"),
        })
    }

    pub fn delete_workspace(&self, id: u64) -> Result<(), ServiceError> {
        self.rpc
            .call_unit("Workspace.delete_workspace", &(WorkspaceIdentity { id },))
    }
}
