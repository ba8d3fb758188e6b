//! Where run logs go when `--log-dir` is not given.
//!
//! `QUAST_VERIFY_HOME` wins over the OS config root, since CI containers often
//! have no home directory. Scratch and unpack directories come from the
//! deployment config instead.

use std::path::{Path, PathBuf};

use directories::BaseDirs;

/// Application folder created under the base directory.
pub const APP_DIR_NAME: &str = ".quast-verify";
/// Environment variable overriding the base directory.
pub const HOME_ENV: &str = "QUAST_VERIFY_HOME";

#[derive(Debug, thiserror::Error)]
pub enum AppDirError {
    #[error("No home or config directory available; set QUAST_VERIFY_HOME")]
    NoBaseDir,
    #[error("Failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Resolve and create `<base>/.quast-verify/logs`.
pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    let home = std::env::var(HOME_ENV).ok();
    let config_root = BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf());
    let dir = resolve_logs_dir(home.as_deref(), config_root).ok_or(AppDirError::NoBaseDir)?;
    ensure_dir(&dir)?;
    Ok(dir)
}

fn resolve_logs_dir(home: Option<&str>, config_root: Option<PathBuf>) -> Option<PathBuf> {
    let base = match home.map(str::trim).filter(|home| !home.is_empty()) {
        Some(home) => PathBuf::from(home),
        None => config_root?,
    };
    Some(base.join(APP_DIR_NAME).join("logs"))
}

fn ensure_dir(path: &Path) -> Result<(), AppDirError> {
    std::fs::create_dir_all(path).map_err(|source| AppDirError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_override_wins_over_config_root() {
        let dir = resolve_logs_dir(Some("/ci/home"), Some(PathBuf::from("/home/u/.config")));
        assert_eq!(dir, Some(PathBuf::from("/ci/home/.quast-verify/logs")));
    }

    #[test]
    fn blank_override_falls_back_to_config_root() {
        let dir = resolve_logs_dir(Some("  "), Some(PathBuf::from("/home/u/.config")));
        assert_eq!(dir, Some(PathBuf::from("/home/u/.config/.quast-verify/logs")));
    }

    #[test]
    fn nothing_to_resolve_against() {
        assert_eq!(resolve_logs_dir(None, None), None);
    }

    #[test]
    fn ensure_dir_creates_nested_path() {
        let temp = tempfile::tempdir().unwrap();
        let nested = temp.path().join(".quast-verify/logs");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
