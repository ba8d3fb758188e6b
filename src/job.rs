//! Job invoker for the QUAST module's `run_QUAST` method.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::services::{Handle, ServiceError, rpc::RpcClient};

/// Fully qualified JSON-RPC method name.
pub const RUN_QUAST_METHOD: &str = "kb_quast.run_QUAST";

/// One input file and the label QUAST reports it under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub label: String,
}

impl FileDescriptor {
    pub fn new(path: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            label: label.into(),
        }
    }
}

/// Input to `run_QUAST`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuastParams {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileDescriptor>,
    /// Workspace references to assemblies, used instead of or alongside `files`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assemblies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub make_handle: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_glimmer: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_contig_length: Option<u64>,
}

impl QuastParams {
    /// Params for a file-based run that asks for a handle to be created.
    pub fn from_files(files: Vec<FileDescriptor>) -> Self {
        Self {
            files,
            make_handle: Some(true),
            ..Self::default()
        }
    }
}

/// Output of a successful `run_QUAST`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuastOutput {
    pub shock_id: String,
    pub handle: Handle,
    pub node_file_name: String,
    pub size: u64,
    #[serde(default)]
    pub quast_path: Option<String>,
}

/// The processing call failed; no result was produced.
#[derive(Debug, thiserror::Error)]
pub enum RemoteExecutionError {
    #[error("Input file {path} does not exist or is not a regular file")]
    MissingInput { path: PathBuf },
    #[error("{method} received no input files or assemblies")]
    EmptyRequest { method: &'static str },
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Runs QUAST somewhere and returns where the packaged result was stored.
pub trait JobInvoker {
    /// Send the request as given; input problems are left to the service.
    fn submit(&self, params: &QuastParams) -> Result<QuastOutput, RemoteExecutionError>;

    /// Check local inputs, then submit.
    fn run_quast(&self, params: &QuastParams) -> Result<QuastOutput, RemoteExecutionError> {
        check_inputs(params)?;
        self.submit(params)
    }
}

/// Invokes `run_QUAST` over JSON-RPC, typically through the SDK callback server.
#[derive(Debug, Clone)]
pub struct RpcJobInvoker {
    rpc: RpcClient,
}

impl RpcJobInvoker {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            rpc: RpcClient::new(url, Some(token.into())),
        }
    }
}

impl JobInvoker for RpcJobInvoker {
    fn submit(&self, params: &QuastParams) -> Result<QuastOutput, RemoteExecutionError> {
        tracing::info!(
            url = self.rpc.url(),
            files = params.files.len(),
            assemblies = params.assemblies.len(),
            "Invoking {RUN_QUAST_METHOD}"
        );
        let (output,): (QuastOutput,) = self.rpc.call(RUN_QUAST_METHOD, &(params,))?;
        tracing::info!(
            shock_id = %output.shock_id,
            hid = %output.handle.hid,
            size = output.size,
            "{RUN_QUAST_METHOD} finished"
        );
        Ok(output)
    }
}

/// Every file path must name an existing regular file before the call goes out.
pub fn check_inputs(params: &QuastParams) -> Result<(), RemoteExecutionError> {
    if params.files.is_empty() && params.assemblies.is_empty() {
        return Err(RemoteExecutionError::EmptyRequest {
            method: RUN_QUAST_METHOD,
        });
    }
    for file in &params.files {
        if !is_regular_file(&file.path) {
            return Err(RemoteExecutionError::MissingInput {
                path: file.path.clone(),
            });
        }
    }
    Ok(())
}

fn is_regular_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|meta| meta.is_file()).unwrap_or(false)
}
