//! Credential storage abstraction.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`CredentialStore`] - Trait for credential storage backends
//! - [`MemoryStore`] - Process-local implementation (the default)
//! - [`FileStore`] - JSON file implementation, shared by processes on one host
//! - [`KeyringStore`] - OS keyring implementation (with `keyring-store` feature)
//! - [`create_store`] - Helper to build a backend from configuration
//!
//! Credentials are keyed by [`CorpId`]. The client never caches credentials
//! itself; every call goes back through the store, so the store is the single
//! authority on which token is current.
//!
//! # Example
//!
//! ```rust,ignore
//! use wecom_core::{CorpId, Credential, CredentialStore, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let corp = CorpId::new("ww1234");
//!
//! store.save(&corp, &Credential::new("token", 7200)).await?;
//! let cached = store.load(&corp).await?;
//! assert!(cached.unwrap().is_valid());
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::{StoreConfig, StoreKind};
use crate::credential::Credential;
use crate::model::CorpId;

mod file;
#[cfg(feature = "keyring-store")]
mod keyring;
mod memory;

pub use file::FileStore;
#[cfg(feature = "keyring-store")]
pub use keyring::KeyringStore;
pub use memory::MemoryStore;

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the memory is zeroed when the value is dropped.
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Error type for credential store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No platform directory could be determined for the default file path.
    #[error("data directory not available")]
    DataDirUnavailable,

    /// The keyring backend is not available.
    #[error("keyring not available: {message}")]
    KeyringUnavailable { message: String },
}

/// Abstraction over credential storage backends.
///
/// Implementations must make [`save`](CredentialStore::save) idempotent:
/// saving the same credential twice is observably the same as saving it once.
/// Concurrent saves for the same corp ID may race; the last write wins.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the current credential for a corp ID.
    ///
    /// Returns `Ok(None)` if no credential has been saved yet. Absence is not
    /// an error.
    async fn load(&self, corp_id: &CorpId) -> Result<Option<Credential>, StoreError>;

    /// Save a credential, replacing any previous one for the corp ID.
    async fn save(&self, corp_id: &CorpId, credential: &Credential) -> Result<(), StoreError>;

    /// Remove the credential for a corp ID.
    ///
    /// Returns `Ok(())` even if nothing was stored.
    async fn clear(&self, corp_id: &CorpId) -> Result<(), StoreError>;

    /// Whether stored state is visible to other processes.
    ///
    /// Process-local stores return `false`, which makes a client running in
    /// distributed mode raise a configuration diagnostic.
    fn is_shared(&self) -> bool {
        true
    }

    /// Short backend name used in logs and diagnostics.
    fn backend_name(&self) -> &'static str;
}

#[async_trait]
impl<T: CredentialStore + ?Sized> CredentialStore for Arc<T> {
    async fn load(&self, corp_id: &CorpId) -> Result<Option<Credential>, StoreError> {
        (**self).load(corp_id).await
    }

    async fn save(&self, corp_id: &CorpId, credential: &Credential) -> Result<(), StoreError> {
        (**self).save(corp_id, credential).await
    }

    async fn clear(&self, corp_id: &CorpId) -> Result<(), StoreError> {
        (**self).clear(corp_id).await
    }

    fn is_shared(&self) -> bool {
        (**self).is_shared()
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }
}

/// Create a credential store from configuration.
///
/// # Backend Selection
///
/// - `memory`: a fresh [`MemoryStore`]
/// - `file`: a [`FileStore`] at the configured path, or the platform default
/// - `keyring`: a [`KeyringStore`] when the `keyring-store` feature is enabled
///   and the platform keyring is reachable; otherwise an error
pub fn create_store(config: &StoreConfig) -> Result<Arc<dyn CredentialStore>, StoreError> {
    match config.kind {
        StoreKind::Memory => {
            tracing::debug!("Using in-memory credential storage");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreKind::File => {
            let path = match &config.path {
                Some(path) => path.clone(),
                None => FileStore::default_path()?,
            };
            tracing::debug!("Using file credential storage at {:?}", path);
            Ok(Arc::new(FileStore::new(path)))
        }
        #[cfg(feature = "keyring-store")]
        StoreKind::Keyring => {
            let store = KeyringStore::try_new(&config.keyring_service)?;
            tracing::info!("Using OS keyring for credential storage");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "keyring-store"))]
        StoreKind::Keyring => Err(StoreError::KeyringUnavailable {
            message: "keyring-store feature not enabled".to_string(),
        }),
    }
}
