//! In-memory credential storage implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{CredentialStore, StoreError};
use crate::credential::Credential;
use crate::model::CorpId;

/// In-memory credential store.
///
/// This is the default backend. It is not persistent and not shared: data is
/// lost when the process exits, and other processes talking to the same
/// enterprise keep their own tokens. Use [`FileStore`](super::FileStore) or a
/// host-supplied store when running more than one process.
///
/// # Thread Safety
///
/// This implementation uses interior mutability via `RwLock` and is
/// safe to share across threads.
pub struct MemoryStore {
    data: RwLock<HashMap<CorpId, Credential>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Create a memory store with initial data.
    pub fn with_data(data: HashMap<CorpId, Credential>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.data.read().map(|d| d.len()).unwrap_or(0);
        f.debug_struct("MemoryStore")
            .field("entries", &count)
            .finish()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::BackendError {
        message: format!("lock poisoned: {}", e),
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load(&self, corp_id: &CorpId) -> Result<Option<Credential>, StoreError> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.get(corp_id).cloned())
    }

    async fn save(&self, corp_id: &CorpId, credential: &Credential) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(poisoned)?;
        data.insert(corp_id.clone(), credential.clone());
        Ok(())
    }

    async fn clear(&self, corp_id: &CorpId) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(poisoned)?;
        data.remove(corp_id);
        Ok(())
    }

    fn is_shared(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_save_load() {
        let store = MemoryStore::new();
        let corp = CorpId::new("ww1");
        let credential = Credential::new("test-token", 7200);

        store.save(&corp, &credential).await.unwrap();
        let loaded = store.load(&corp).await.unwrap();

        assert_eq!(loaded, Some(credential));
    }

    #[tokio::test]
    async fn test_memory_store_load_absent() {
        let store = MemoryStore::new();
        let result = store.load(&CorpId::new("nobody")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_memory_store_save_is_idempotent() {
        let once = MemoryStore::new();
        let twice = MemoryStore::new();
        let corp = CorpId::new("ww1");
        let credential = Credential::new("test-token", 7200);

        once.save(&corp, &credential).await.unwrap();
        twice.save(&corp, &credential).await.unwrap();
        twice.save(&corp, &credential).await.unwrap();

        assert_eq!(once.load(&corp).await.unwrap(), twice.load(&corp).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_store_save_replaces() {
        let store = MemoryStore::new();
        let corp = CorpId::new("ww1");

        store.save(&corp, &Credential::new("old", 7200)).await.unwrap();
        store.save(&corp, &Credential::new("new", 7200)).await.unwrap();

        let loaded = store.load(&corp).await.unwrap().unwrap();
        assert_eq!(loaded.token().expose(), "new");
    }

    #[tokio::test]
    async fn test_memory_store_keys_are_per_corp() {
        let store = MemoryStore::new();
        store
            .save(&CorpId::new("a"), &Credential::new("token-a", 60))
            .await
            .unwrap();

        assert!(store.load(&CorpId::new("b")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_clear() {
        let store = MemoryStore::new();
        let corp = CorpId::new("ww1");

        store.save(&corp, &Credential::new("t", 60)).await.unwrap();
        store.clear(&corp).await.unwrap();
        store.clear(&corp).await.unwrap();

        assert!(store.load(&corp).await.unwrap().is_none());
    }
}
