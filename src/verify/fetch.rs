//! Ways of materializing a stored result archive in a local directory.

use std::path::Path;

use crate::services::{BlobStoreClient, FileStagingClient, ServiceError};

use super::archive::{self, ArchiveError};

/// Failure fetching or unpacking an archive.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Places the unpacked contents of a stored archive into `dest_dir`.
pub trait ArtifactFetcher {
    fn fetch_unpacked(&self, shock_id: &str, file_name: &str, dest_dir: &Path)
    -> Result<(), FetchError>;
}

/// Asks DataFileUtil (via the callback server) to download and unpack the node.
pub struct StagingFetcher<'a> {
    staging: &'a FileStagingClient,
}

impl<'a> StagingFetcher<'a> {
    pub fn new(staging: &'a FileStagingClient) -> Self {
        Self { staging }
    }
}

impl ArtifactFetcher for StagingFetcher<'_> {
    fn fetch_unpacked(
        &self,
        shock_id: &str,
        file_name: &str,
        dest_dir: &Path,
    ) -> Result<(), FetchError> {
        std::fs::create_dir_all(dest_dir)?;
        let output = self
            .staging
            .shock_to_file_unpacked(shock_id, &dest_dir.join(file_name))?;
        tracing::debug!(
            shock_id,
            file_path = output.file_path.as_deref().unwrap_or(""),
            "Staged and unpacked archive"
        );
        Ok(())
    }
}

/// Downloads the node straight from Shock and unzips it locally.
pub struct DirectFetcher<'a> {
    blob_store: &'a BlobStoreClient,
}

impl<'a> DirectFetcher<'a> {
    pub fn new(blob_store: &'a BlobStoreClient) -> Self {
        Self { blob_store }
    }
}

impl ArtifactFetcher for DirectFetcher<'_> {
    fn fetch_unpacked(
        &self,
        shock_id: &str,
        file_name: &str,
        dest_dir: &Path,
    ) -> Result<(), FetchError> {
        std::fs::create_dir_all(dest_dir)?;
        let zip_path = dest_dir.join(file_name);
        self.blob_store.download_node(shock_id, &zip_path)?;
        let files = archive::unzip_to_dir(&zip_path, dest_dir)?;
        tracing::debug!(shock_id, files, "Downloaded and unpacked archive");
        Ok(())
    }
}
