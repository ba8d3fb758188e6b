//! Cross-service verification of a `run_QUAST` result.
//!
//! A result is only trusted once the blob store, the embedded handle, the
//! handle service and the archive contents all agree with it. Checks run in a
//! fixed order and stop at the first divergence, because each one relies on
//! facts the previous ones established (the node id, the handle id, the
//! archive name).

mod archive;
mod fetch;

use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::{
    job::QuastOutput,
    services::{BlobStoreClient, Handle, HandleServiceClient, ServiceError, ShockNode},
};

pub use archive::{ArchiveError, md5_file, unzip_to_dir};
pub use fetch::{ArtifactFetcher, DirectFetcher, FetchError, StagingFetcher};

/// Name QUAST gives its packaged results.
pub const QUAST_ARCHIVE_NAME: &str = "quast_results.zip";
/// Handle type for Shock-backed handles.
pub const SHOCK_HANDLE_TYPE: &str = "shock";

/// Looks up blob-store node records.
pub trait NodeLookup {
    fn node(&self, id: &str) -> Result<ShockNode, ServiceError>;
}

/// Resolves handle ids through the handle service.
pub trait HandleLookup {
    fn resolve(&self, hids: &[String]) -> Result<Vec<Handle>, ServiceError>;
}

impl NodeLookup for BlobStoreClient {
    fn node(&self, id: &str) -> Result<ShockNode, ServiceError> {
        self.get_node(id)
    }
}

impl HandleLookup for HandleServiceClient {
    fn resolve(&self, hids: &[String]) -> Result<Vec<Handle>, ServiceError> {
        self.hids_to_handles(hids)
    }
}

/// Exclusive bounds on the archive size.
///
/// The zip embeds timestamps, so its exact size drifts between runs while
/// staying within a few bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeTolerance {
    pub min_exclusive: u64,
    pub max_exclusive: u64,
}

impl SizeTolerance {
    pub const fn between(min_exclusive: u64, max_exclusive: u64) -> Self {
        Self {
            min_exclusive,
            max_exclusive,
        }
    }

    pub fn contains(self, size: u64) -> bool {
        size > self.min_exclusive && size < self.max_exclusive
    }
}

/// A file inside the archive whose content is pinned by checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoldenFile {
    pub name: String,
    pub md5: String,
}

impl GoldenFile {
    pub fn new(name: impl Into<String>, md5: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            md5: md5.into(),
        }
    }
}

/// What a correct result looks like for one scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectations {
    pub file_name: String,
    pub size: SizeTolerance,
    pub golden_files: Vec<GoldenFile>,
}

/// Individual verification stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    FileName,
    SizeRange,
    StorageNode,
    EmbeddedHandle,
    ResolvedHandle,
    ArchiveContents,
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::FileName => "file name",
            Self::SizeRange => "size range",
            Self::StorageNode => "storage node",
            Self::EmbeddedHandle => "embedded handle",
            Self::ResolvedHandle => "resolved handle",
            Self::ArchiveContents => "archive contents",
        };
        f.write_str(label)
    }
}

/// The first check that failed, with the diverging values.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("[file name] node_file_name is '{actual}', expected '{expected}'")]
    FileName { expected: String, actual: String },
    #[error("[size range] size {size} is outside ({min_exclusive}, {max_exclusive})")]
    SizeOutOfRange {
        size: u64,
        min_exclusive: u64,
        max_exclusive: u64,
    },
    #[error("[{check}] {field} mismatch: expected '{expected}', got '{actual}'")]
    FieldMismatch {
        check: Check,
        field: &'static str,
        expected: String,
        actual: String,
    },
    #[error("[resolved handle] expected exactly one handle for {hid}, got {count}")]
    HandleCount { hid: String, count: usize },
    #[error("[archive contents] {file} checksum mismatch: expected {expected}, got {actual}")]
    Checksum {
        file: String,
        expected: String,
        actual: String,
    },
    #[error("[archive contents] {file} not found in {}", .dir.display())]
    MissingFile { file: String, dir: PathBuf },
    #[error("[{check}] service call failed: {source}")]
    Service {
        check: Check,
        #[source]
        source: ServiceError,
    },
    #[error("[archive contents] fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

/// Summary of a fully verified result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub shock_id: String,
    pub hid: String,
    pub size: u64,
    pub unpack_dir: PathBuf,
    pub passed: Vec<Check>,
}

/// Runs the verification chain against live (or fake) collaborators.
pub struct ResultVerifier<'a> {
    blob_store_url: &'a str,
    nodes: &'a dyn NodeLookup,
    handles: &'a dyn HandleLookup,
    fetcher: &'a dyn ArtifactFetcher,
    work_dir: &'a Path,
}

impl<'a> ResultVerifier<'a> {
    /// `blob_store_url` is the configured Shock URL every handle must carry;
    /// archives are unpacked under `work_dir`.
    pub fn new(
        blob_store_url: &'a str,
        nodes: &'a dyn NodeLookup,
        handles: &'a dyn HandleLookup,
        fetcher: &'a dyn ArtifactFetcher,
        work_dir: &'a Path,
    ) -> Self {
        Self {
            blob_store_url,
            nodes,
            handles,
            fetcher,
            work_dir,
        }
    }

    pub fn verify(
        &self,
        output: &QuastOutput,
        expect: &Expectations,
    ) -> Result<VerificationReport, VerificationError> {
        let mut passed = Vec::with_capacity(6);

        if output.node_file_name != expect.file_name {
            return Err(VerificationError::FileName {
                expected: expect.file_name.clone(),
                actual: output.node_file_name.clone(),
            });
        }
        passed.push(Check::FileName);

        if !expect.size.contains(output.size) {
            return Err(VerificationError::SizeOutOfRange {
                size: output.size,
                min_exclusive: expect.size.min_exclusive,
                max_exclusive: expect.size.max_exclusive,
            });
        }
        passed.push(Check::SizeRange);

        let node = self.check_storage_node(output, expect)?;
        passed.push(Check::StorageNode);

        check_embedded_handle(&output.handle, &node, self.blob_store_url, expect)?;
        passed.push(Check::EmbeddedHandle);

        self.check_resolved_handle(&output.handle)?;
        passed.push(Check::ResolvedHandle);

        let unpack_dir = self.check_archive(output, expect)?;
        passed.push(Check::ArchiveContents);

        tracing::info!(
            shock_id = %output.shock_id,
            hid = %output.handle.hid,
            size = output.size,
            unpack_dir = %unpack_dir.display(),
            "Result verified"
        );
        Ok(VerificationReport {
            shock_id: output.shock_id.clone(),
            hid: output.handle.hid.clone(),
            size: output.size,
            unpack_dir,
            passed,
        })
    }

    fn check_storage_node(
        &self,
        output: &QuastOutput,
        expect: &Expectations,
    ) -> Result<ShockNode, VerificationError> {
        let check = Check::StorageNode;
        let node = self
            .nodes
            .node(&output.shock_id)
            .map_err(|source| VerificationError::Service { check, source })?;
        expect_eq(check, "id", &output.shock_id, &node.id)?;
        expect_eq(check, "file.name", &expect.file_name, &node.file.name)?;
        expect_eq(
            check,
            "file.size",
            &output.size.to_string(),
            &node.file.size.to_string(),
        )?;
        Ok(node)
    }

    fn check_resolved_handle(&self, embedded: &Handle) -> Result<(), VerificationError> {
        let check = Check::ResolvedHandle;
        let records = self
            .handles
            .resolve(std::slice::from_ref(&embedded.hid))
            .map_err(|source| VerificationError::Service { check, source })?;
        let [resolved] = records.as_slice() else {
            return Err(VerificationError::HandleCount {
                hid: embedded.hid.clone(),
                count: records.len(),
            });
        };
        compare_handles(check, embedded, resolved)
    }

    fn check_archive(
        &self,
        output: &QuastOutput,
        expect: &Expectations,
    ) -> Result<PathBuf, VerificationError> {
        let unpack_dir = self.work_dir.join(uuid::Uuid::new_v4().to_string());
        self.fetcher
            .fetch_unpacked(&output.shock_id, &expect.file_name, &unpack_dir)?;
        for golden in &expect.golden_files {
            let path = unpack_dir.join(&golden.name);
            if !path.is_file() {
                return Err(VerificationError::MissingFile {
                    file: golden.name.clone(),
                    dir: unpack_dir,
                });
            }
            let actual = md5_file(&path).map_err(FetchError::Io)?;
            if !actual.eq_ignore_ascii_case(&golden.md5) {
                return Err(VerificationError::Checksum {
                    file: golden.name.clone(),
                    expected: golden.md5.clone(),
                    actual,
                });
            }
            tracing::debug!(file = %golden.name, md5 = %actual, "Golden checksum matched");
        }
        Ok(unpack_dir)
    }
}

fn check_embedded_handle(
    handle: &Handle,
    node: &ShockNode,
    blob_store_url: &str,
    expect: &Expectations,
) -> Result<(), VerificationError> {
    let check = Check::EmbeddedHandle;
    expect_eq(check, "url", blob_store_url, &handle.url)?;
    expect_eq(check, "file_name", &expect.file_name, &handle.file_name)?;
    expect_eq(check, "type", SHOCK_HANDLE_TYPE, &handle.kind)?;
    expect_eq(check, "id", &node.id, &handle.id)?;
    let node_md5 = node.file.checksum.md5.as_deref().unwrap_or("<none>");
    expect_eq(check, "remote_md5", node_md5, &handle.remote_md5)
}

/// Every field resolved through the handle service must equal the embedded one.
fn compare_handles(
    check: Check,
    embedded: &Handle,
    resolved: &Handle,
) -> Result<(), VerificationError> {
    expect_eq(check, "url", &embedded.url, &resolved.url)?;
    expect_eq(check, "hid", &embedded.hid, &resolved.hid)?;
    expect_eq(check, "file_name", &embedded.file_name, &resolved.file_name)?;
    expect_eq(check, "type", &embedded.kind, &resolved.kind)?;
    expect_eq(check, "id", &embedded.id, &resolved.id)?;
    expect_eq(check, "remote_md5", &embedded.remote_md5, &resolved.remote_md5)
}

fn expect_eq(
    check: Check,
    field: &'static str,
    expected: &str,
    actual: &str,
) -> Result<(), VerificationError> {
    if expected == actual {
        return Ok(());
    }
    Err(VerificationError::FieldMismatch {
        check,
        field,
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}
