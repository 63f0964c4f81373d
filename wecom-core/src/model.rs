//! Domain model types.
//!
//! This module defines the identity types used throughout the crate:
//! - [`CorpId`] - Identifier of a WeCom enterprise account
//! - [`Identity`] - A corp ID paired with the shared secret used to obtain tokens

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::store::Secret;

/// Identifier of a WeCom enterprise (the `corpid` issued by the admin console).
///
/// Corp IDs are case-sensitive and used verbatim as storage keys.
///
/// # Examples
///
/// ```
/// use wecom_core::CorpId;
///
/// let corp = CorpId::new("ww1234567890abcdef");
/// assert_eq!(corp.as_str(), "ww1234567890abcdef");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorpId(String);

impl CorpId {
    /// Create a new corp ID. Surrounding whitespace is trimmed.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.len() == id.len() {
            Self(id)
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Get the corp ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the ID is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CorpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CorpId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CorpId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// The enterprise account and its shared secret.
///
/// The secret is configuration: it is sent to the token endpoint but never
/// persisted alongside the access token.
#[derive(Debug, Clone)]
pub struct Identity {
    corp_id: CorpId,
    secret: Secret,
}

impl Identity {
    /// Create a new identity.
    pub fn new(corp_id: impl Into<CorpId>, secret: impl Into<String>) -> Self {
        Self {
            corp_id: corp_id.into(),
            secret: Secret::new(secret),
        }
    }

    /// The corp ID this identity authenticates as.
    pub fn corp_id(&self) -> &CorpId {
        &self.corp_id
    }

    /// The shared secret.
    pub fn secret(&self) -> &Secret {
        &self.secret
    }
}
