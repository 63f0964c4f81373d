//! Client configuration.
//!
//! [`ClientConfig`] is the TOML-loadable description of a client:
//!
//! ```toml
//! corp_id = "ww1234567890abcdef"
//! # corp_secret may be omitted and supplied via WECOM_CORP_SECRET
//! corp_secret = "..."
//! deployment_mode = "distributed"
//! missing_credential = "exchange"
//! single_flight = true
//! agent_id = 1000002
//!
//! [store]
//! kind = "file"
//! path = "/var/lib/wecom/tokens.json"
//!
//! [request]
//! timeout_secs = 10
//! headers = { "user-agent" = "wecom-rs" }
//! ```

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::endpoint::DEFAULT_BASE_URL;
use crate::store::Secret;
use crate::transport::RequestDefaults;

/// Environment variable consulted when the config file has no secret.
pub const SECRET_ENV_VAR: &str = "WECOM_CORP_SECRET";

/// Error type for configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the configuration file.
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required setting is missing.
    #[error("missing required setting: {field}")]
    Missing { field: &'static str },

    /// A URL could not be parsed.
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// A default header name or value is not valid HTTP.
    #[error("invalid header {name:?}: {message}")]
    InvalidHeader { name: String, message: String },

    /// Some other invalid setting.
    #[error("{message}")]
    Invalid { message: String },

    /// Configuration directory not available.
    #[error("configuration directory not available")]
    ConfigDirUnavailable,

    /// Strict mode turned construction-time diagnostics into an error.
    #[error("strict mode rejected configuration: {}", join_diagnostics(.0))]
    Rejected(Vec<ConfigDiagnostic>),
}

fn join_diagnostics(diagnostics: &[ConfigDiagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// How many processes share the same enterprise credentials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentMode {
    /// One process owns the credential.
    #[default]
    SingleProcess,

    /// Several processes or hosts act for the same corp and must share tokens.
    Distributed,
}

/// What to do when the store has never held a credential for the corp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingCredential {
    /// Exchange the secret for a token, same as for an expired one.
    #[default]
    Exchange,

    /// Fail with `ApiError::NoCredential` so the host can run its own
    /// authorization step.
    Fail,
}

/// Credential storage backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    /// Process-local memory.
    #[default]
    Memory,

    /// JSON file.
    File,

    /// OS keyring (requires the `keyring-store` feature).
    Keyring,
}

/// Storage section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend to use.
    #[serde(default)]
    pub kind: StoreKind,

    /// File path for the `file` backend; platform default when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Service name prefix for keyring entries.
    #[serde(default = "default_keyring_service")]
    pub keyring_service: String,
}

fn default_keyring_service() -> String {
    "wecom".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            path: None,
            keyring_service: default_keyring_service(),
        }
    }
}

/// Default request options section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Timeout for every request, in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl RequestConfig {
    /// Convert into transport defaults, validating header names and values.
    pub fn to_defaults(&self) -> Result<RequestDefaults, ConfigError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| ConfigError::InvalidHeader {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| ConfigError::InvalidHeader {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            headers.insert(header_name, header_value);
        }

        Ok(RequestDefaults {
            headers,
            timeout: self.timeout_secs.map(Duration::from_secs),
        })
    }
}

/// Full client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Enterprise corp ID.
    pub corp_id: String,

    /// Application secret. Falls back to `WECOM_CORP_SECRET` when absent.
    #[serde(default)]
    pub corp_secret: Option<Secret>,

    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Deployment mode, checked against the storage backend.
    #[serde(default)]
    pub deployment_mode: DeploymentMode,

    /// Policy for a corp that has never been issued a token.
    #[serde(default)]
    pub missing_credential: MissingCredential,

    /// Serialize token exchanges per corp within this process.
    #[serde(default)]
    pub single_flight: bool,

    /// Treat configuration diagnostics as errors.
    #[serde(default)]
    pub strict: bool,

    /// Default application ID for messages.
    #[serde(default)]
    pub agent_id: Option<i64>,

    /// Storage section.
    #[serde(default)]
    pub store: StoreConfig,

    /// Default request options.
    #[serde(default)]
    pub request: RequestConfig,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl ClientConfig {
    /// Minimal configuration for a corp, everything else defaulted.
    pub fn new(corp_id: impl Into<String>, corp_secret: impl Into<String>) -> Self {
        Self {
            corp_id: corp_id.into(),
            corp_secret: Some(Secret::new(corp_secret)),
            base_url: default_base_url(),
            deployment_mode: DeploymentMode::default(),
            missing_credential: MissingCredential::default(),
            single_flight: false,
            strict: false,
            agent_id: None,
            store: StoreConfig::default(),
            request: RequestConfig::default(),
        }
    }

    /// Default configuration file location: `<config dir>/config.toml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dirs = directories::ProjectDirs::from("com", "wecom-rs", "wecom")
            .ok_or(ConfigError::ConfigDirUnavailable)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Parse a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Resolve the secret from the file or the environment.
    pub fn corp_secret(&self) -> Result<Secret, ConfigError> {
        self.corp_secret_or(std::env::var(SECRET_ENV_VAR).ok())
    }

    fn corp_secret_or(&self, env_value: Option<String>) -> Result<Secret, ConfigError> {
        self.corp_secret
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| env_value.filter(|s| !s.is_empty()).map(Secret::new))
            .ok_or(ConfigError::Missing {
                field: "corp_secret",
            })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.corp_id.trim().is_empty() {
            return Err(ConfigError::Missing { field: "corp_id" });
        }
        if self.request.timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                message: "request.timeout_secs must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// A problem with the configuration that does not stop the client from
/// working but will likely cause trouble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigDiagnostic {
    /// Distributed deployment with a store that other processes cannot see.
    /// Each process would fetch and hold its own token, and WeCom invalidates
    /// older tokens as new ones are issued.
    ProcessLocalStore { backend: &'static str },
}

impl fmt::Display for ConfigDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProcessLocalStore { backend } => write!(
                f,
                "the {} credential store is process-local but deployment mode is distributed; \
                 access tokens will not be shared between processes",
                backend
            ),
        }
    }
}

/// Check a deployment mode against a storage backend.
pub fn diagnose(
    mode: DeploymentMode,
    store_is_shared: bool,
    backend: &'static str,
) -> Vec<ConfigDiagnostic> {
    let mut diagnostics = Vec::new();
    if mode == DeploymentMode::Distributed && !store_is_shared {
        diagnostics.push(ConfigDiagnostic::ProcessLocalStore { backend });
    }
    diagnostics
}
