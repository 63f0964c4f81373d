//! JSON file credential storage.
//!
//! Credentials for every corp ID live in a single JSON document:
//!
//! ```json
//! {
//!   "version": 1,
//!   "credentials": {
//!     "ww1234": { "access_token": "...", "expires_in": 7200, "create_at": 1700000000000 }
//!   }
//! }
//! ```
//!
//! The file is re-read on every load, so several processes on the same host
//! observe each other's refreshes. Every read-modify-write holds an exclusive
//! advisory lock on a sibling `<name>.lock` file, and the new document is
//! written to a uniquely named temporary file that is then renamed over the
//! original. Readers never see a partially written document.

use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{CredentialStore, StoreError};
use crate::credential::Credential;
use crate::model::CorpId;

const FORMAT_VERSION: u32 = 1;

/// On-disk document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileStoreData {
    /// Version of the store format.
    version: u32,

    #[serde(default)]
    credentials: BTreeMap<CorpId, Credential>,
}

impl Default for FileStoreData {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            credentials: BTreeMap::new(),
        }
    }
}

/// File-backed credential store.
///
/// A missing file reads as an empty store; parent directories are created on
/// first write. Any number of `FileStore`s, in this process or others, may
/// point at the same path.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Platform default location: `<data dir>/tokens.json`.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let dirs = directories::ProjectDirs::from("com", "wecom-rs", "wecom")
            .ok_or(StoreError::DataDirUnavailable)?;
        Ok(dirs.data_dir().join("tokens.json"))
    }

    /// Get the storage path for this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `apply` against the current document under the file lock, writing
    /// the result back when it reports a change.
    async fn update<F>(&self, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut FileStoreData) -> bool + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || locked_update(&path, apply))
            .await
            .map_err(|e| StoreError::BackendError {
                message: format!("file store task failed: {}", e),
            })?
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tokens.json".to_string())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn lock_path(path: &Path) -> PathBuf {
    path.with_file_name(format!("{}.lock", file_name(path)))
}

fn read(path: &Path) -> Result<FileStoreData, StoreError> {
    match fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => Ok(FileStoreData::default()),
        Ok(contents) => {
            let data: FileStoreData = serde_json::from_str(&contents)?;
            if data.version != FORMAT_VERSION {
                return Err(StoreError::BackendError {
                    message: format!(
                        "unsupported token file version {} in {:?}",
                        data.version, path
                    ),
                });
            }
            Ok(data)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileStoreData::default()),
        Err(e) => Err(e.into()),
    }
}

fn write(path: &Path, data: &FileStoreData) -> Result<(), StoreError> {
    let contents = serde_json::to_string_pretty(data)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name(path)))
        .suffix(".tmp")
        .tempfile_in(parent_dir(path))?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn locked_update<F>(path: &Path, apply: F) -> Result<(), StoreError>
where
    F: FnOnce(&mut FileStoreData) -> bool,
{
    fs::create_dir_all(parent_dir(path))?;

    let lock_file: File = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path(path))?;
    FileExt::lock_exclusive(&lock_file)?;

    let result = read(path).and_then(|mut data| {
        if apply(&mut data) {
            write(path, &data)
        } else {
            Ok(())
        }
    });

    // Closing the file would release the lock too.
    let _ = FileExt::unlock(&lock_file);
    result
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn load(&self, corp_id: &CorpId) -> Result<Option<Credential>, StoreError> {
        let data = read(&self.path)?;
        Ok(data.credentials.get(corp_id).cloned())
    }

    async fn save(&self, corp_id: &CorpId, credential: &Credential) -> Result<(), StoreError> {
        let corp_id = corp_id.clone();
        let credential = credential.clone();

        self.update(move |data| {
            if data.credentials.get(&corp_id) == Some(&credential) {
                return false;
            }
            data.credentials.insert(corp_id, credential);
            true
        })
        .await
    }

    async fn clear(&self, corp_id: &CorpId) -> Result<(), StoreError> {
        let corp_id = corp_id.clone();
        self.update(move |data| data.credentials.remove(&corp_id).is_some())
            .await
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
