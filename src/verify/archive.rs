use std::{fs::File, path::Path};

use md5::{Digest, Md5};

const MAX_ENTRIES: usize = 10_000;
const MAX_ENTRY_BYTES: u64 = 512 * 1024 * 1024;
const MAX_TOTAL_BYTES: u64 = 2 * 1024 * 1024 * 1024;
const MAX_COMPRESSION_RATIO: u64 = 200;

/// Failure reading or extracting a result archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Archive has {count} entries, limit is {limit}")]
    TooManyEntries { count: usize, limit: usize },
    #[error("Entry '{name}' unpacks to {size} bytes, limit is {limit}")]
    EntryTooLarge { name: String, size: u64, limit: u64 },
    #[error("Entry '{name}' exceeds the compression ratio limit")]
    SuspiciousRatio { name: String },
    #[error("Archive unpacks to more than {limit} bytes")]
    TotalTooLarge { limit: u64 },
}

/// Caps applied while unpacking an archive from a remote store.
#[derive(Clone, Copy)]
struct ExtractionBudget {
    max_entries: usize,
    max_entry_bytes: u64,
    max_total_bytes: u64,
    max_ratio: u64,
    spent: u64,
}

impl ExtractionBudget {
    fn standard() -> Self {
        Self::new(MAX_ENTRIES, MAX_ENTRY_BYTES, MAX_TOTAL_BYTES, MAX_COMPRESSION_RATIO)
    }

    fn new(max_entries: usize, max_entry_bytes: u64, max_total_bytes: u64, max_ratio: u64) -> Self {
        Self {
            max_entries,
            max_entry_bytes,
            max_total_bytes,
            max_ratio,
            spent: 0,
        }
    }

    fn admit_archive(&self, count: usize) -> Result<(), ArchiveError> {
        if count > self.max_entries {
            return Err(ArchiveError::TooManyEntries {
                count,
                limit: self.max_entries,
            });
        }
        Ok(())
    }

    /// Charge one entry against the budget using its declared sizes.
    fn admit_entry(&mut self, name: &str, size: u64, compressed: u64) -> Result<(), ArchiveError> {
        if size > self.max_entry_bytes {
            return Err(ArchiveError::EntryTooLarge {
                name: name.to_string(),
                size,
                limit: self.max_entry_bytes,
            });
        }
        if size > 0 && (compressed == 0 || size > compressed.saturating_mul(self.max_ratio)) {
            return Err(ArchiveError::SuspiciousRatio {
                name: name.to_string(),
            });
        }
        self.spent = self
            .spent
            .checked_add(size)
            .filter(|total| *total <= self.max_total_bytes)
            .ok_or(ArchiveError::TotalTooLarge {
                limit: self.max_total_bytes,
            })?;
        Ok(())
    }
}

/// Compute the lowercase hex MD5 digest of a local file.
pub fn md5_file(path: &Path) -> Result<String, std::io::Error> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Unpack `zip_path` into `dest_dir`, returning the number of files written.
///
/// Entries whose names would land outside `dest_dir` are skipped with a warning.
pub fn unzip_to_dir(zip_path: &Path, dest_dir: &Path) -> Result<usize, ArchiveError> {
    unzip_with_budget(zip_path, dest_dir, ExtractionBudget::standard())
}

fn unzip_with_budget(
    zip_path: &Path,
    dest_dir: &Path,
    mut budget: ExtractionBudget,
) -> Result<usize, ArchiveError> {
    let mut archive = zip::ZipArchive::new(File::open(zip_path)?)?;
    budget.admit_archive(archive.len())?;

    let mut written = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        budget.admit_entry(entry.name(), entry.size(), entry.compressed_size())?;
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(entry = entry.name(), "Skipping archive entry outside destination");
            continue;
        };
        let target = dest_dir.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::io::copy(&mut entry, &mut File::create(&target)?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                // Drop setuid/setgid/sticky and group/world write bits.
                let mode = if mode & 0o111 != 0 { 0o755 } else { 0o644 };
                std::fs::set_permissions(&target, std::fs::Permissions::from_mode(mode))?;
            }
        }
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
pub(crate) fn write_zip(path: &Path, entries: &[(&str, &[u8])]) -> Result<(), ArchiveError> {
    use std::io::Write;

    let file = File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(data)?;
    }
    zip.finish()?;
    Ok(())
}
