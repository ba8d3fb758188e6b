//! Blocking clients for the remote services the harness talks to.
//!
//! Each client is a thin wrapper over one endpoint: the auth session exchange,
//! the workspace and handle services (JSON-RPC 1.1), the Shock blob store
//! (REST), and the DataFileUtil staging module reached through the SDK
//! callback server.

pub mod auth;
pub mod blobstore;
pub mod file_staging;
pub mod handle_service;
pub(crate) mod rpc;
pub mod workspace;

pub use auth::{AuthenticationError, login};
pub use blobstore::{BlobStoreClient, NodeChecksum, NodeFile, ShockNode};
pub use file_staging::{FileStagingClient, ShockToFileOutput};
pub use handle_service::{Handle, HandleServiceClient};
pub use workspace::{WorkspaceClient, WorkspaceInfo};

use crate::http_client;

const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

/// Failure talking to a remote service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Connection, DNS, TLS or timeout failure.
    #[error("HTTP error calling {url}: {message}")]
    Transport { url: String, message: String },
    /// Non-success HTTP status without a structured error body.
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    /// A JSON-RPC call returned an `error` object.
    #[error("{method} failed: {name} ({code}): {message}")]
    Rpc {
        method: String,
        name: String,
        code: i64,
        message: String,
    },
    /// The response could not be decoded into the expected shape.
    #[error("Invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },
    /// Local file I/O while streaming a download.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// True when the remote side reported the resource as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

/// Map a `ureq` failure into a [`ServiceError`], draining a bounded error body.
pub(crate) fn map_ureq_error(url: &str, err: ureq::Error) -> ServiceError {
    match err {
        ureq::Error::Status(status, response) => ServiceError::Status {
            url: url.to_string(),
            status,
            body: read_error_body(response),
        },
        ureq::Error::Transport(err) => ServiceError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        },
    }
}

pub(crate) fn read_error_body(response: ureq::Response) -> String {
    http_client::read_response_text(response, MAX_ERROR_BODY_BYTES)
        .map(|body| body.trim().to_string())
        .unwrap_or_else(|err| format!("<unreadable body: {err}>"))
}
