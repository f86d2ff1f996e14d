//! Cloud store capability: the shared medium between devices.
//!
//! The reconciler only needs key/value get/set, whole-file
//! read/write/remove and a change notification stream. How the platform
//! actually replicates the data is outside this crate.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

use crate::error::SyncError;
use crate::events::{CloudChange, CloudChangeReason, EVENT_CHANNEL_CAPACITY};

/// Key/value file inside a [`DirectoryCloudStore`] root.
const KV_FILE_NAME: &str = "kv.json";

/// Directory holding shared documents inside a [`DirectoryCloudStore`] root.
const DOCUMENTS_DIR_NAME: &str = "Documents";

/// Shared, multi-device visible key/value and file store.
#[async_trait]
pub trait CloudStore: Send + Sync + 'static {
    async fn get_value(&self, key: &str) -> Result<Option<Value>, SyncError>;

    async fn set_value(&self, key: &str, value: Value) -> Result<(), SyncError>;

    async fn keys(&self) -> Result<Vec<String>, SyncError>;

    /// Whole file content, `None` when the file does not exist.
    async fn read_file(&self, name: &str) -> Result<Option<Vec<u8>>, SyncError>;

    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), SyncError>;

    /// Remove a file. Removing an absent file is not an error.
    async fn remove_file(&self, name: &str) -> Result<(), SyncError>;

    async fn file_exists(&self, name: &str) -> Result<bool, SyncError> {
        Ok(self.read_file(name).await?.is_some())
    }

    /// Notifications about changes made outside this process.
    fn subscribe(&self) -> broadcast::Receiver<CloudChange>;
}

/// Reject document names that would escape the documents directory.
pub(crate) fn validate_file_name(name: &str) -> Result<(), SyncError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\');
    if valid {
        Ok(())
    } else {
        Err(SyncError::Cloud(format!("invalid file name '{name}'")))
    }
}

// ─── Directory-backed store ─────────────────────────────────────────────

/// Cloud store backed by a directory the platform keeps in sync
/// (a mounted ubiquity container, a synced folder, a network share).
///
/// Values live in `kv.json`, files in `Documents/`. The platform's own
/// change signal is forwarded with [`DirectoryCloudStore::notify_external_change`].
pub struct DirectoryCloudStore {
    root: PathBuf,
    kv_lock: Mutex<()>,
    changes: broadcast::Sender<CloudChange>,
}

impl DirectoryCloudStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            root: root.into(),
            kv_lock: Mutex::new(()),
            changes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Announce a change made by another device.
    pub fn notify_external_change(&self, reason: CloudChangeReason, keys: Vec<String>) {
        tracing::debug!(?reason, keys = keys.len(), "cloud store changed externally");
        let _ = self.changes.send(CloudChange { reason, keys });
    }

    fn kv_path(&self) -> PathBuf {
        self.root.join(KV_FILE_NAME)
    }

    fn document_path(&self, name: &str) -> Result<PathBuf, SyncError> {
        validate_file_name(name)?;
        Ok(self.root.join(DOCUMENTS_DIR_NAME).join(name))
    }

    async fn read_kv(&self) -> Result<BTreeMap<String, Value>, SyncError> {
        match tokio::fs::read(self.kv_path()).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| SyncError::Cloud(format!("invalid {KV_FILE_NAME}: {e}"))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SyncError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl CloudStore for DirectoryCloudStore {
    async fn get_value(&self, key: &str) -> Result<Option<Value>, SyncError> {
        let _guard = self.kv_lock.lock().await;
        Ok(self.read_kv().await?.remove(key))
    }

    async fn set_value(&self, key: &str, value: Value) -> Result<(), SyncError> {
        let _guard = self.kv_lock.lock().await;
        let mut values = self.read_kv().await?;
        values.insert(key.to_string(), value);
        let bytes = serde_json::to_vec_pretty(&values)?;
        Self::write_atomic(&self.kv_path(), &bytes).await
    }

    async fn keys(&self) -> Result<Vec<String>, SyncError> {
        let _guard = self.kv_lock.lock().await;
        Ok(self.read_kv().await?.into_keys().collect())
    }

    async fn read_file(&self, name: &str) -> Result<Option<Vec<u8>>, SyncError> {
        let path = self.document_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), SyncError> {
        let path = self.document_path(name)?;
        Self::write_atomic(&path, bytes).await
    }

    async fn remove_file(&self, name: &str) -> Result<(), SyncError> {
        let path = self.document_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn file_exists(&self, name: &str) -> Result<bool, SyncError> {
        let path = self.document_path(name)?;
        Ok(tokio::fs::metadata(&path).await.is_ok())
    }

    fn subscribe(&self) -> broadcast::Receiver<CloudChange> {
        self.changes.subscribe()
    }
}
