//! Local preference store: flat key/value settings of this device.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, Mutex};

use crate::error::SyncError;
use crate::events::{ChangeOrigin, PreferenceChange, EVENT_CHANNEL_CAPACITY};

/// File name of the preference file under the data dir.
pub const PREFERENCES_FILE_NAME: &str = "preferences.json";

/// Flat key/value store of local settings.
///
/// Any part of the application may write; the reconciler observes it.
#[async_trait]
pub trait PreferenceStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Value>, SyncError>;

    /// Store a value. Returns whether the stored value changed; only
    /// changes are persisted and announced.
    async fn set(&self, key: &str, value: Value, origin: ChangeOrigin) -> Result<bool, SyncError>;

    /// All current values.
    async fn snapshot(&self) -> Result<Map<String, Value>, SyncError>;

    fn subscribe(&self) -> broadcast::Receiver<PreferenceChange>;
}

/// JSON-file backed [`PreferenceStore`], rewritten in full on every change.
pub struct JsonPreferenceStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
    changes: broadcast::Sender<PreferenceChange>,
}

impl JsonPreferenceStore {
    /// Open the store at `path`, reading existing values if the file exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let path = path.into();
        let values = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                SyncError::Preferences(format!("invalid preference file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };
        let (changes, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            path,
            values: Mutex::new(values),
            changes,
        })
    }

    /// Open `preferences.json` under a data directory.
    pub async fn open_in(data_dir: impl AsRef<Path>) -> Result<Self, SyncError> {
        Self::open(data_dir.as_ref().join(PREFERENCES_FILE_NAME)).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, values: &Map<String, Value>) -> Result<(), SyncError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for JsonPreferenceStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, SyncError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value, origin: ChangeOrigin) -> Result<bool, SyncError> {
        let mut values = self.values.lock().await;
        if values.get(key) == Some(&value) {
            return Ok(false);
        }

        let previous = values.insert(key.to_string(), value);
        if let Err(e) = self.persist(&values).await {
            // Keep memory and disk in agreement.
            match previous {
                Some(old) => values.insert(key.to_string(), old),
                None => values.remove(key),
            };
            return Err(e);
        }
        drop(values);

        let _ = self.changes.send(PreferenceChange {
            key: key.to_string(),
            origin,
        });
        Ok(true)
    }

    async fn snapshot(&self) -> Result<Map<String, Value>, SyncError> {
        Ok(self.values.lock().await.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<PreferenceChange> {
        self.changes.subscribe()
    }
}
