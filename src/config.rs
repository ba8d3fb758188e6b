//! Deployment configuration and environment inputs.
//!
//! The deployment config is a TOML file whose `[kb_quast]` table names the
//! service endpoints and the scratch directory:
//!
//! ```toml
//! [kb_quast]
//! shock-url = "https://kbase.us/services/shock-api"
//! workspace-url = "https://kbase.us/services/ws"
//! handle-service-url = "https://kbase.us/services/handle_service"
//! scratch = "/kb/module/work/tmp"
//! ```
//!
//! Both the file and the environment are read once at startup and validated
//! into plain structs; a missing required key fails before any network call.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Section of the deployment config holding this module's settings.
pub const CONFIG_SECTION: &str = "kb_quast";
/// Environment variable carrying the auth token.
pub const TOKEN_ENV: &str = "KB_AUTH_TOKEN";
/// Environment variable carrying the deployment config path.
pub const CONFIG_PATH_ENV: &str = "KB_DEPLOYMENT_CONFIG";
/// Environment variable carrying the SDK callback service URL.
pub const CALLBACK_URL_ENV: &str = "SDK_CALLBACK_URL";
/// Session-exchange endpoint used when the config does not name one.
pub const DEFAULT_AUTH_URL: &str = "https://kbase.us/services/authorization/Sessions/Login";

/// Errors raised while reading the environment or the deployment config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is unset or blank.
    #[error("Environment variable {0} is not set")]
    MissingEnv(&'static str),
    /// Failed to read the config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to parse the config file as TOML.
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        /// Config file path.
        path: PathBuf,
        /// TOML parse error.
        source: toml::de::Error,
    },
    /// The `[kb_quast]` table is absent.
    #[error("Config at {path} has no [{section}] section")]
    MissingSection {
        /// Config file path.
        path: PathBuf,
        /// Expected section name.
        section: &'static str,
    },
    /// A required key is absent or blank.
    #[error("Config at {path} is missing required key '{key}'")]
    MissingKey {
        /// Config file path.
        path: PathBuf,
        /// Missing key name.
        key: &'static str,
    },
    /// A URL-valued key does not hold an http(s) URL.
    #[error("Config key '{key}' has invalid URL '{value}': {reason}")]
    InvalidUrl {
        /// Offending key.
        key: &'static str,
        /// Raw value.
        value: String,
        /// Parse failure or scheme problem.
        reason: String,
    },
}

/// Inputs taken from the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvInputs {
    /// Auth token (`KB_AUTH_TOKEN`).
    pub token: Option<String>,
    /// SDK callback URL (`SDK_CALLBACK_URL`).
    pub callback_url: Option<String>,
    /// Deployment config path (`KB_DEPLOYMENT_CONFIG`).
    pub config_path: Option<PathBuf>,
}

impl EnvInputs {
    /// Read every input once from the process environment.
    pub fn from_env() -> Self {
        Self {
            token: non_blank_env(TOKEN_ENV),
            callback_url: non_blank_env(CALLBACK_URL_ENV),
            config_path: non_blank_env(CONFIG_PATH_ENV).map(PathBuf::from),
        }
    }

    /// Path of the deployment config, or an error naming the variable.
    pub fn require_config_path(&self) -> Result<&Path, ConfigError> {
        self.config_path
            .as_deref()
            .ok_or(ConfigError::MissingEnv(CONFIG_PATH_ENV))
    }
}

fn non_blank_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Validated `[kb_quast]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    /// Blob store (Shock) base URL, kept verbatim for handle comparisons.
    pub shock_url: String,
    /// Workspace service URL.
    pub workspace_url: String,
    /// Handle service URL.
    pub handle_service_url: String,
    /// Local scratch directory, wiped at setup.
    pub scratch: PathBuf,
    /// Session-exchange endpoint.
    pub auth_url: String,
    /// Endpoint serving `kb_quast.run_QUAST`; the callback URL when absent.
    pub quast_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfigFile {
    kb_quast: Option<RawSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawSection {
    shock_url: Option<String>,
    workspace_url: Option<String>,
    handle_service_url: Option<String>,
    scratch: Option<String>,
    auth_service_url: Option<String>,
    quast_service_url: Option<String>,
}

impl DeployConfig {
    /// Load and validate the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Parse and validate config text; `path` is only used in error messages.
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfigFile = toml::from_str(text).map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })?;
        let section = raw.kb_quast.ok_or_else(|| ConfigError::MissingSection {
            path: path.to_path_buf(),
            section: CONFIG_SECTION,
        })?;
        let required = |value: Option<String>, key: &'static str| {
            value
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| ConfigError::MissingKey {
                    path: path.to_path_buf(),
                    key,
                })
        };

        let shock_url = validate_url("shock-url", required(section.shock_url, "shock-url")?)?;
        let workspace_url = validate_url(
            "workspace-url",
            required(section.workspace_url, "workspace-url")?,
        )?;
        let handle_service_url = validate_url(
            "handle-service-url",
            required(section.handle_service_url, "handle-service-url")?,
        )?;
        let scratch = PathBuf::from(required(section.scratch, "scratch")?);
        let auth_url = match section.auth_service_url.filter(|v| !v.trim().is_empty()) {
            Some(value) => validate_url("auth-service-url", value.trim().to_string())?,
            None => DEFAULT_AUTH_URL.to_string(),
        };
        let quast_url = section
            .quast_service_url
            .filter(|v| !v.trim().is_empty())
            .map(|value| validate_url("quast-service-url", value.trim().to_string()))
            .transpose()?;

        Ok(Self {
            shock_url,
            workspace_url,
            handle_service_url,
            scratch,
            auth_url,
            quast_url,
        })
    }
}

fn validate_url(key: &'static str, value: String) -> Result<String, ConfigError> {
    let parsed = Url::parse(&value).map_err(|err| ConfigError::InvalidUrl {
        key,
        value: value.clone(),
        reason: err.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(value),
        other => Err(ConfigError::InvalidUrl {
            key,
            value,
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}
