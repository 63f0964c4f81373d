//! API base URL handling.

use url::Url;

use crate::config::ConfigError;

/// Production base URL of the WeCom server API.
pub const DEFAULT_BASE_URL: &str = "https://qyapi.weixin.qq.com";

/// Resolves endpoint paths against the API base URL.
///
/// Paths are joined relative to the base, so a base with a path prefix
/// (for example a reverse proxy at `https://proxy/wecom/`) keeps that prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    /// Parse a base URL.
    pub fn new(base: &str) -> Result<Self, ConfigError> {
        let mut base = Url::parse(base).map_err(|source| ConfigError::InvalidUrl {
            url: base.to_string(),
            source,
        })?;

        if base.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                message: format!("{} cannot be used as a base URL", base),
            });
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.set_query(None);

        Ok(Self { base })
    }

    /// The base URL, always ending in `/`.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve an endpoint path such as `cgi-bin/message/send`.
    pub fn url(&self, path: &str) -> Result<Url, ConfigError> {
        let path = path.trim_start_matches('/');
        self.base
            .join(path)
            .map_err(|source| ConfigError::InvalidUrl {
                url: format!("{}{}", self.base, path),
                source,
            })
    }
}
