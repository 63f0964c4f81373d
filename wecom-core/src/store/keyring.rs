//! OS keyring-backed credential storage implementation.

use async_trait::async_trait;
use keyring::Entry;

use super::{CredentialStore, StoreError};
use crate::credential::Credential;
use crate::model::CorpId;

const ENTRY_USER: &str = "wecom";

/// OS keyring-backed credential store.
///
/// This store uses the platform's native keyring service:
/// - macOS: Keychain
/// - Linux: Secret Service API (via libsecret)
/// - Windows: Credential Manager
///
/// Each corp ID gets one entry named `{service_name}/{corp_id}` whose password
/// is the JSON form of the [`Credential`]. The keyring is per-user and shared
/// by every process of that user.
pub struct KeyringStore {
    service_name: String,
}

impl KeyringStore {
    /// Try to create a new keyring store.
    ///
    /// Writes, reads back and deletes a check entry through separate handles.
    /// Returns [`StoreError::KeyringUnavailable`] when no platform backend is
    /// reachable or when the backend does not keep what was written.
    pub fn try_new(service_name: &str) -> Result<Self, StoreError> {
        let check_service = format!("{}/__check__", service_name);
        let unavailable = |message: String| StoreError::KeyringUnavailable { message };

        let value = format!("check-{}", std::process::id());
        Entry::new(&check_service, ENTRY_USER)
            .and_then(|entry| entry.set_password(&value))
            .map_err(|e| unavailable(format!("keyring backend not available: {}", e)))?;

        let readback = Entry::new(&check_service, ENTRY_USER).and_then(|entry| {
            let stored = entry.get_password();
            let _ = entry.delete_credential();
            stored
        });

        match readback {
            Ok(stored) if stored == value => Ok(Self {
                service_name: service_name.to_string(),
            }),
            Ok(_) => Err(unavailable(
                "keyring returned a different value than was written".to_string(),
            )),
            Err(e) => Err(unavailable(format!(
                "keyring does not persist entries: {}",
                e
            ))),
        }
    }

    fn entry(&self, corp_id: &CorpId) -> Result<Entry, StoreError> {
        let service = format!("{}/{}", self.service_name, corp_id);
        Entry::new(&service, ENTRY_USER).map_err(|e| StoreError::BackendError {
            message: format!("failed to create keyring entry: {}", e),
        })
    }
}

impl std::fmt::Debug for KeyringStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringStore")
            .field("service_name", &self.service_name)
            .finish()
    }
}

#[async_trait]
impl CredentialStore for KeyringStore {
    async fn load(&self, corp_id: &CorpId) -> Result<Option<Credential>, StoreError> {
        let entry = self.entry(corp_id)?;

        match entry.get_password() {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(keyring::Error::Ambiguous(_)) => Err(StoreError::BackendError {
                message: format!("ambiguous keyring entry for corp {}", corp_id),
            }),
            Err(keyring::Error::PlatformFailure(e)) => Err(StoreError::BackendError {
                message: format!("platform keyring failure: {}", e),
            }),
            Err(e) => Err(StoreError::BackendError {
                message: format!("keyring error: {}", e),
            }),
        }
    }

    async fn save(&self, corp_id: &CorpId, credential: &Credential) -> Result<(), StoreError> {
        let entry = self.entry(corp_id)?;
        let json = serde_json::to_string(credential)?;

        entry
            .set_password(&json)
            .map_err(|e| StoreError::BackendError {
                message: format!("failed to set keyring password: {}", e),
            })
    }

    async fn clear(&self, corp_id: &CorpId) -> Result<(), StoreError> {
        let entry = self.entry(corp_id)?;

        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::BackendError {
                message: format!("failed to delete keyring entry: {}", e),
            }),
        }
    }

    fn backend_name(&self) -> &'static str {
        "keyring"
    }
}
