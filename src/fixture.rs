//! Run-wide fixture: authenticated clients, a scratch directory and an
//! ephemeral workspace, plus best-effort teardown of everything a run created.

use std::{
    fs,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{
    config::{CALLBACK_URL_ENV, ConfigError, DeployConfig, EnvInputs},
    error::HarnessError,
    job::RpcJobInvoker,
    services::{
        self, AuthenticationError, BlobStoreClient, FileStagingClient, HandleServiceClient,
        ServiceError, WorkspaceClient, WorkspaceInfo,
    },
};

const WORKSPACE_PREFIX: &str = "test_quast_";

/// Immutable state shared by every scenario in a run.
#[derive(Debug)]
pub struct TestContext {
    pub config: DeployConfig,
    pub user_id: String,
    pub workspace: WorkspaceInfo,
    pub workspace_client: WorkspaceClient,
    pub blob_store: BlobStoreClient,
    pub handle_service: HandleServiceClient,
    /// DataFileUtil via the callback server, when one is configured.
    pub staging: Option<FileStagingClient>,
    pub quast: RpcJobInvoker,
}

impl TestContext {
    pub fn scratch(&self) -> &Path {
        &self.config.scratch
    }
}

/// Remote artifacts created during the run, released at teardown.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupLedger {
    nodes: Vec<String>,
    hids: Vec<String>,
}

impl CleanupLedger {
    pub fn register_node(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.nodes.contains(&id) {
            self.nodes.push(id);
        }
    }

    pub fn register_handle(&mut self, hid: impl Into<String>) {
        let hid = hid.into();
        if !self.hids.contains(&hid) {
            self.hids.push(hid);
        }
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn hids(&self) -> &[String] {
        &self.hids
    }
}

/// One teardown step that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    #[error("Failed to delete workspace {id}: {source}")]
    Workspace { id: u64, source: ServiceError },
    #[error("Failed to delete Shock node {id}: {source}")]
    Node { id: String, source: ServiceError },
    #[error("Failed to delete handles {hids:?}: {source}")]
    Handles {
        hids: Vec<String>,
        source: ServiceError,
    },
}

/// Outcome of teardown; failures are collected, never raised.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub workspace_deleted: bool,
    pub nodes_deleted: Vec<String>,
    pub handles_deleted: Vec<String>,
    pub errors: Vec<CleanupError>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Owns the context and the ledger; tears the run down exactly once.
#[derive(Debug)]
pub struct Fixture {
    ctx: TestContext,
    ledger: CleanupLedger,
    torn_down: bool,
}

impl Fixture {
    /// Build the run context. Any failure here aborts the run.
    pub fn setup(env: &EnvInputs) -> Result<Self, HarnessError> {
        let config = DeployConfig::load(env.require_config_path()?)?;
        let quast_url = config
            .quast_url
            .clone()
            .or_else(|| env.callback_url.clone())
            .ok_or(ConfigError::MissingEnv(CALLBACK_URL_ENV))?;
        let token = env
            .token
            .clone()
            .ok_or(AuthenticationError::MissingToken)?;
        let user_id = services::login(&config.auth_url, &token)?;
        tracing::info!(user_id = %user_id, "Authenticated");

        reset_scratch(&config.scratch)?;

        let workspace_client = WorkspaceClient::new(&config.workspace_url, &token);
        let blob_store = BlobStoreClient::new(&config.shock_url, &token);
        let handle_service = HandleServiceClient::new(&config.handle_service_url, &token);
        let staging = env
            .callback_url
            .as_ref()
            .map(|url| FileStagingClient::new(url, &token));
        let quast = RpcJobInvoker::new(quast_url, &token);

        let workspace = workspace_client.create_workspace(&workspace_name(SystemTime::now()))?;
        tracing::info!(id = workspace.id, name = %workspace.name, "Created test workspace");

        Ok(Self {
            ctx: TestContext {
                config,
                user_id,
                workspace,
                workspace_client,
                blob_store,
                handle_service,
                staging,
                quast,
            },
            ledger: CleanupLedger::default(),
            torn_down: false,
        })
    }

    pub fn context(&self) -> &TestContext {
        &self.ctx
    }

    pub fn ledger(&self) -> &CleanupLedger {
        &self.ledger
    }

    /// Shared context alongside the mutable ledger, for running a scenario.
    pub fn parts(&mut self) -> (&TestContext, &mut CleanupLedger) {
        (&self.ctx, &mut self.ledger)
    }

    /// Release every remote resource the run created.
    pub fn teardown(mut self) -> CleanupReport {
        self.release()
    }

    fn release(&mut self) -> CleanupReport {
        if self.torn_down {
            return CleanupReport::default();
        }
        self.torn_down = true;
        let report = release_all(&self.ctx, &self.ledger);
        for err in &report.errors {
            tracing::warn!("Cleanup: {err}");
        }
        report
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        if !self.torn_down {
            tracing::warn!("Fixture dropped without explicit teardown; cleaning up");
            let _ = self.release();
        }
    }
}

/// Each step runs regardless of the others' outcome.
fn release_all(ctx: &TestContext, ledger: &CleanupLedger) -> CleanupReport {
    let mut report = CleanupReport::default();

    let ws_id = ctx.workspace.id;
    match ctx.workspace_client.delete_workspace(ws_id) {
        Ok(()) => {
            tracing::info!(id = ws_id, "Deleted test workspace");
            report.workspace_deleted = true;
        }
        Err(source) => report.errors.push(CleanupError::Workspace { id: ws_id, source }),
    }

    for node in ledger.nodes() {
        match ctx.blob_store.delete_node(node) {
            Ok(()) => {
                tracing::info!(node = %node, "Deleted Shock node");
                report.nodes_deleted.push(node.clone());
            }
            Err(source) => report.errors.push(CleanupError::Node {
                id: node.clone(),
                source,
            }),
        }
    }

    if !ledger.hids().is_empty() {
        let deleted = ctx
            .handle_service
            .hids_to_handles(ledger.hids())
            .and_then(|handles| {
                ctx.handle_service.delete_handles(&handles)?;
                Ok(handles.into_iter().map(|handle| handle.hid).collect::<Vec<_>>())
            });
        match deleted {
            Ok(hids) => {
                tracing::info!(?hids, "Deleted handles");
                report.handles_deleted = hids;
            }
            Err(source) => report.errors.push(CleanupError::Handles {
                hids: ledger.hids().to_vec(),
                source,
            }),
        }
    }

    report
}

fn reset_scratch(scratch: &Path) -> Result<(), HarnessError> {
    let io_err = |source| HarnessError::Scratch {
        path: scratch.to_path_buf(),
        source,
    };
    if scratch.exists() {
        fs::remove_dir_all(scratch).map_err(io_err)?;
    }
    fs::create_dir_all(scratch).map_err(io_err)?;
    Ok(())
}

fn workspace_name(now: SystemTime) -> String {
    let millis = now
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    format!("{WORKSPACE_PREFIX}{millis}")
}
