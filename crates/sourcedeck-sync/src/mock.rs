//! In-memory cloud store for testing.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

use crate::cloud::{validate_file_name, CloudStore};
use crate::error::SyncError;
use crate::events::{CloudChange, CloudChangeReason, EVENT_CHANNEL_CAPACITY};

#[derive(Default)]
struct Contents {
    values: BTreeMap<String, Value>,
    files: BTreeMap<String, Vec<u8>>,
}

struct Shared {
    contents: RwLock<Contents>,
    /// One sender per device handle, keyed by device number.
    devices: StdMutex<Vec<(usize, broadcast::Sender<CloudChange>)>>,
    next_device: AtomicUsize,
    available: AtomicBool,
    writes: AtomicUsize,
}

/// Cloud store held in memory and shared between "devices".
///
/// Every handle from [`MemoryCloudStore::device_handle`] sees the same
/// data; a write through one handle is announced to all the others,
/// never to the writer itself.
pub struct MemoryCloudStore {
    device: usize,
    changes: broadcast::Sender<CloudChange>,
    shared: Arc<Shared>,
}

impl Default for MemoryCloudStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCloudStore {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            contents: RwLock::new(Contents::default()),
            devices: StdMutex::new(Vec::new()),
            next_device: AtomicUsize::new(0),
            available: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
        });
        Self::attach(shared)
    }

    /// Another device sharing the same cloud data.
    pub fn device_handle(&self) -> Self {
        Self::attach(Arc::clone(&self.shared))
    }

    fn attach(shared: Arc<Shared>) -> Self {
        let device = shared.next_device.fetch_add(1, Ordering::SeqCst);
        let (changes, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        if let Ok(mut devices) = shared.devices.lock() {
            devices.push((device, changes.clone()));
        }
        Self {
            device,
            changes,
            shared,
        }
    }

    /// Simulate the cloud store going offline (or coming back).
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    /// Number of writes (values and files) made by all devices.
    pub fn write_count(&self) -> usize {
        self.shared.writes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), SyncError> {
        if self.shared.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::CloudUnavailable)
        }
    }

    fn announce(&self, keys: Vec<String>) {
        self.shared.writes.fetch_add(1, Ordering::SeqCst);
        let Ok(devices) = self.shared.devices.lock() else {
            return;
        };
        for (device, sender) in devices.iter() {
            if *device != self.device {
                let _ = sender.send(CloudChange {
                    reason: CloudChangeReason::ServerChange,
                    keys: keys.clone(),
                });
            }
        }
    }
}

#[async_trait]
impl CloudStore for MemoryCloudStore {
    async fn get_value(&self, key: &str) -> Result<Option<Value>, SyncError> {
        self.check_available()?;
        Ok(self.shared.contents.read().await.values.get(key).cloned())
    }

    async fn set_value(&self, key: &str, value: Value) -> Result<(), SyncError> {
        self.check_available()?;
        self.shared
            .contents
            .write()
            .await
            .values
            .insert(key.to_string(), value);
        self.announce(vec![key.to_string()]);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, SyncError> {
        self.check_available()?;
        Ok(self.shared.contents.read().await.values.keys().cloned().collect())
    }

    async fn read_file(&self, name: &str) -> Result<Option<Vec<u8>>, SyncError> {
        self.check_available()?;
        validate_file_name(name)?;
        Ok(self.shared.contents.read().await.files.get(name).cloned())
    }

    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), SyncError> {
        self.check_available()?;
        validate_file_name(name)?;
        self.shared
            .contents
            .write()
            .await
            .files
            .insert(name.to_string(), bytes.to_vec());
        self.announce(Vec::new());
        Ok(())
    }

    async fn remove_file(&self, name: &str) -> Result<(), SyncError> {
        self.check_available()?;
        validate_file_name(name)?;
        if self.shared.contents.write().await.files.remove(name).is_some() {
            self.announce(Vec::new());
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<CloudChange> {
        self.changes.subscribe()
    }
}
