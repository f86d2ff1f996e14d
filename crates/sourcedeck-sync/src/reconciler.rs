//! Cloud reconciler: keeps the local catalog file and synced preferences
//! consistent with the shared cloud store.
//!
//! The reconciler keeps no state between runs. Each run compares the two
//! copies and, depending on direction, replaces one with the other:
//!
//! - **Pull** (launch, foreground, external cloud change): cloud wins.
//! - **Push** (background, local preference change): local wins.
//!
//! Conflicts are resolved per file and per key, never per record: a
//! device that pulls a divergent catalog before pushing its own loses its
//! local-only changes.

use std::fmt::Display;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sourcedeck_modules::catalog::{decode_catalog, encode_catalog, validate_catalog};
use sourcedeck_modules::{CatalogStore, CATALOG_FILE_NAME};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::cloud::CloudStore;
use crate::error::SyncError;
use crate::events::{ChangeOrigin, SyncEvent, SyncTrigger, EVENT_CHANNEL_CAPACITY};
use crate::keys::{is_syncable, sync_key_set};
use crate::preferences::PreferenceStore;

// ─── Reports ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    Pull,
    Push,
}

/// What happened to the catalog file during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogOutcome {
    /// The run did not touch the catalog.
    NotRun,
    /// Both copies were already identical.
    Unchanged,
    /// The local file was replaced with the cloud file.
    Pulled,
    /// The cloud file was replaced with the local file.
    Pushed,
    /// The cloud had no catalog; the local one was copied up.
    BootstrappedFromLocal,
    /// Neither side had a catalog; an empty one was written to both.
    BootstrappedEmpty,
    /// Push with no local catalog file.
    NothingToPush,
    Failed,
}

/// Outcome of a reconciliation run. Per-item failures end up in `errors`.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub direction: SyncDirection,
    pub preferences_changed: usize,
    pub catalog: CatalogOutcome,
    pub errors: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    fn new(direction: SyncDirection) -> Self {
        Self {
            direction,
            preferences_changed: 0,
            catalog: CatalogOutcome::NotRun,
            errors: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    fn record_error(&mut self, context: &str, err: impl Display) {
        warn!(direction = ?self.direction, context, "sync step failed: {err}");
        self.errors.push(format!("{context}: {err}"));
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

// ─── Reconciler ─────────────────────────────────────────────────────────

/// Service object reconciling one device with the cloud store.
pub struct CloudReconciler {
    catalog: Arc<CatalogStore>,
    preferences: Arc<dyn PreferenceStore>,
    cloud: Arc<dyn CloudStore>,
    events: broadcast::Sender<SyncEvent>,
    /// One reconciliation run at a time.
    run_lock: Mutex<()>,
}

impl CloudReconciler {
    pub fn new(
        catalog: Arc<CatalogStore>,
        preferences: Arc<dyn PreferenceStore>,
        cloud: Arc<dyn CloudStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            catalog,
            preferences,
            cloud,
            events,
            run_lock: Mutex::new(()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn cloud(&self) -> &Arc<dyn CloudStore> {
        &self.cloud
    }

    pub fn preferences(&self) -> &Arc<dyn PreferenceStore> {
        &self.preferences
    }

    fn emit(&self, event: SyncEvent) {
        debug!(?event, "emitting sync event");
        let _ = self.events.send(event);
    }

    /// Run the reconciliation a trigger calls for.
    pub async fn handle(&self, trigger: SyncTrigger) -> SyncReport {
        info!(?trigger, "reconciling with cloud store");
        let report = match trigger {
            SyncTrigger::Launch | SyncTrigger::Foreground | SyncTrigger::CloudChanged => {
                self.pull_all().await
            }
            SyncTrigger::Background => self.push_all().await,
            SyncTrigger::PreferencesChanged => self.push_preferences().await,
        };
        info!(
            ?trigger,
            preferences_changed = report.preferences_changed,
            catalog = ?report.catalog,
            errors = report.errors.len(),
            "reconciliation finished"
        );
        report
    }

    /// Preferences then catalog, cloud wins.
    pub async fn pull_all(&self) -> SyncReport {
        let _run = self.run_lock.lock().await;
        let mut report = SyncReport::new(SyncDirection::Pull);
        self.pull_preferences_into(&mut report).await;
        self.pull_catalog_into(&mut report).await;
        report.finish()
    }

    /// Preferences then catalog, local wins.
    pub async fn push_all(&self) -> SyncReport {
        let _run = self.run_lock.lock().await;
        let mut report = SyncReport::new(SyncDirection::Push);
        self.push_preferences_into(&mut report).await;
        self.push_catalog_into(&mut report).await;
        report.finish()
    }

    pub async fn pull_preferences(&self) -> SyncReport {
        let _run = self.run_lock.lock().await;
        let mut report = SyncReport::new(SyncDirection::Pull);
        self.pull_preferences_into(&mut report).await;
        report.finish()
    }

    pub async fn push_preferences(&self) -> SyncReport {
        let _run = self.run_lock.lock().await;
        let mut report = SyncReport::new(SyncDirection::Push);
        self.push_preferences_into(&mut report).await;
        report.finish()
    }

    pub async fn pull_catalog(&self) -> SyncReport {
        let _run = self.run_lock.lock().await;
        let mut report = SyncReport::new(SyncDirection::Pull);
        self.pull_catalog_into(&mut report).await;
        report.finish()
    }

    pub async fn push_catalog(&self) -> SyncReport {
        let _run = self.run_lock.lock().await;
        let mut report = SyncReport::new(SyncDirection::Push);
        self.push_catalog_into(&mut report).await;
        report.finish()
    }

    // ── Preferences ─────────────────────────────────────────────────────

    async fn pull_preferences_into(&self, report: &mut SyncReport) {
        let local = match self.preferences.snapshot().await {
            Ok(values) => values,
            Err(e) => return report.record_error("read local preferences", e),
        };
        let cloud_keys = match self.cloud.keys().await {
            Ok(keys) => keys,
            Err(e) => return report.record_error("list cloud preferences", e),
        };

        let keys = sync_key_set(
            local
                .keys()
                .map(String::as_str)
                .chain(cloud_keys.iter().map(String::as_str)),
        );

        let mut changed = 0;
        for key in keys {
            let value = match self.cloud.get_value(&key).await {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    report.record_error(&format!("read cloud preference '{key}'"), e);
                    continue;
                }
            };
            if !is_syncable(&key, &value) {
                debug!(key = %key, "skipping non-scalar cloud preference");
                continue;
            }
            if local.get(&key) == Some(&value) {
                continue;
            }
            match self.preferences.set(&key, value, ChangeOrigin::Sync).await {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(e) => report.record_error(&format!("write local preference '{key}'"), e),
            }
        }

        report.preferences_changed += changed;
        if changed > 0 {
            info!(changed, "preferences pulled from cloud");
            self.emit(SyncEvent::PreferencesSynced { changed });
        }
    }

    async fn push_preferences_into(&self, report: &mut SyncReport) {
        let local = match self.preferences.snapshot().await {
            Ok(values) => values,
            Err(e) => return report.record_error("read local preferences", e),
        };

        let mut changed = 0;
        for (key, value) in local {
            if !is_syncable(&key, &value) {
                continue;
            }
            match self.cloud.get_value(&key).await {
                Ok(Some(current)) if current == value => continue,
                Ok(_) => {}
                Err(e) => {
                    report.record_error(&format!("read cloud preference '{key}'"), e);
                    continue;
                }
            }
            match self.cloud.set_value(&key, value).await {
                Ok(()) => changed += 1,
                Err(e) => report.record_error(&format!("write cloud preference '{key}'"), e),
            }
        }

        report.preferences_changed += changed;
        if changed > 0 {
            info!(changed, "preferences pushed to cloud");
        }
    }

    // ── Catalog ─────────────────────────────────────────────────────────

    async fn pull_catalog_into(&self, report: &mut SyncReport) {
        match self.pull_catalog_file().await {
            Ok(outcome) => report.catalog = outcome,
            Err(e) => {
                report.catalog = CatalogOutcome::Failed;
                report.record_error("pull catalog", e);
            }
        }
    }

    async fn push_catalog_into(&self, report: &mut SyncReport) {
        match self.push_catalog_file().await {
            Ok(outcome) => report.catalog = outcome,
            Err(e) => {
                report.catalog = CatalogOutcome::Failed;
                report.record_error("push catalog", e);
            }
        }
    }

    async fn pull_catalog_file(&self) -> Result<CatalogOutcome, SyncError> {
        let cloud = self.cloud.read_file(CATALOG_FILE_NAME).await?;

        let txn = self.catalog.lock().await;
        let local = txn.read_raw().await?;

        let outcome = match (cloud, local) {
            (None, Some(local)) => {
                self.cloud.write_file(CATALOG_FILE_NAME, &local).await?;
                info!("cloud catalog bootstrapped from local catalog");
                CatalogOutcome::BootstrappedFromLocal
            }
            (None, None) => {
                let empty = encode_catalog(&[])?;
                txn.write_raw(&empty).await?;
                self.cloud.write_file(CATALOG_FILE_NAME, &empty).await?;
                info!("empty catalog created locally and in cloud");
                CatalogOutcome::BootstrappedEmpty
            }
            (Some(cloud), Some(local)) if cloud == local => CatalogOutcome::Unchanged,
            (Some(cloud), _) => {
                // Never let an unreadable cloud copy replace a good local one.
                let records = decode_catalog(&cloud)?;
                validate_catalog(&records)?;
                txn.write_raw(&cloud).await?;
                info!(modules = records.len(), "local catalog replaced from cloud");
                CatalogOutcome::Pulled
            }
        };
        drop(txn);

        if outcome == CatalogOutcome::Pulled {
            self.emit(SyncEvent::CatalogSynced);
        }
        Ok(outcome)
    }

    async fn push_catalog_file(&self) -> Result<CatalogOutcome, SyncError> {
        let local = self.catalog.lock().await.read_raw().await?;
        let Some(local) = local else {
            debug!("no local catalog to push");
            return Ok(CatalogOutcome::NothingToPush);
        };

        let cloud = self.cloud.read_file(CATALOG_FILE_NAME).await?;
        if cloud.as_deref() == Some(local.as_slice()) {
            return Ok(CatalogOutcome::Unchanged);
        }

        self.cloud.write_file(CATALOG_FILE_NAME, &local).await?;
        info!(bytes = local.len(), "catalog pushed to cloud");
        Ok(CatalogOutcome::Pushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MemoryCloudStore;
    use crate::preferences::JsonPreferenceStore;
    use serde_json::json;
    use sourcedeck_modules::{ModuleDescriptor, ModuleRecord};

    struct Device {
        _dir: tempfile::TempDir,
        catalog: Arc<CatalogStore>,
        prefs: Arc<JsonPreferenceStore>,
        reconciler: CloudReconciler,
    }

    async fn device(cloud: MemoryCloudStore) -> Device {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(CatalogStore::new(dir.path()));
        let prefs = Arc::new(JsonPreferenceStore::open_in(dir.path()).await.unwrap());
        let reconciler = CloudReconciler::new(catalog.clone(), prefs.clone(), Arc::new(cloud));
        Device {
            _dir: dir,
            catalog,
            prefs,
            reconciler,
        }
    }

    fn record(url: &str) -> ModuleRecord {
        let descriptor: ModuleDescriptor = serde_json::from_value(json!({
            "sourceName": url,
            "author": { "name": "a", "icon": "" },
            "iconUrl": "",
            "version": "1.0",
            "language": "en",
            "baseUrl": "https://example.com",
            "streamType": "HLS",
            "quality": "1080p",
            "searchBaseUrl": "https://example.com/s",
            "scriptUrl": "https://example.com/s.js"
        }))
        .unwrap();
        ModuleRecord::new(descriptor, url)
    }

    fn catalog_bytes(urls: &[&str]) -> Vec<u8> {
        let records: Vec<ModuleRecord> = urls.iter().map(|u| record(u)).collect();
        encode_catalog(&records).unwrap()
    }

    async fn local_catalog(d: &Device) -> Option<Vec<u8>> {
        d.catalog.lock().await.read_raw().await.unwrap()
    }

    async fn write_local_catalog(d: &Device, bytes: &[u8]) {
        d.catalog.lock().await.write_raw(bytes).await.unwrap();
    }

    // ── Catalog pull ────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_pull_bootstraps_empty_catalog_on_both_sides() {
        let cloud = MemoryCloudStore::new();
        let d = device(cloud.device_handle()).await;

        let report = d.reconciler.pull_catalog().await;

        assert_eq!(report.catalog, CatalogOutcome::BootstrappedEmpty);
        let empty = encode_catalog(&[]).unwrap();
        assert_eq!(local_catalog(&d).await, Some(empty.clone()));
        assert_eq!(cloud.read_file(CATALOG_FILE_NAME).await.unwrap(), Some(empty));
    }

    #[tokio::test]
    async fn test_pull_bootstraps_cloud_from_local() {
        let cloud = MemoryCloudStore::new();
        let d = device(cloud.device_handle()).await;
        let local = catalog_bytes(&["https://a/m.json"]);
        write_local_catalog(&d, &local).await;
        let mut events = d.reconciler.subscribe();

        let report = d.reconciler.pull_catalog().await;

        assert_eq!(report.catalog, CatalogOutcome::BootstrappedFromLocal);
        assert_eq!(cloud.read_file(CATALOG_FILE_NAME).await.unwrap(), Some(local));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_pull_replaces_divergent_local_catalog() {
        let cloud = MemoryCloudStore::new();
        let d = device(cloud.device_handle()).await;
        write_local_catalog(&d, &catalog_bytes(&["https://local/m.json"])).await;
        let remote = catalog_bytes(&["https://remote/m.json"]);
        cloud.write_file(CATALOG_FILE_NAME, &remote).await.unwrap();
        let mut events = d.reconciler.subscribe();

        let report = d.reconciler.pull_catalog().await;

        assert_eq!(report.catalog, CatalogOutcome::Pulled);
        assert_eq!(local_catalog(&d).await, Some(remote));
        assert_eq!(events.try_recv().unwrap(), SyncEvent::CatalogSynced);
        let records = d.catalog.records().await.unwrap();
        assert_eq!(records[0].metadata_url, "https://remote/m.json");
    }

    #[tokio::test]
    async fn test_pull_identical_catalog_is_noop() {
        let cloud = MemoryCloudStore::new();
        let d = device(cloud.device_handle()).await;
        let bytes = catalog_bytes(&["https://a/m.json"]);
        write_local_catalog(&d, &bytes).await;
        cloud.write_file(CATALOG_FILE_NAME, &bytes).await.unwrap();
        let writes = cloud.write_count();
        let mut events = d.reconciler.subscribe();

        let report = d.reconciler.pull_catalog().await;

        assert_eq!(report.catalog, CatalogOutcome::Unchanged);
        assert_eq!(cloud.write_count(), writes);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_pull_rejects_corrupt_cloud_catalog() {
        let cloud = MemoryCloudStore::new();
        let d = device(cloud.device_handle()).await;
        let local = catalog_bytes(&["https://a/m.json"]);
        write_local_catalog(&d, &local).await;
        cloud
            .write_file(CATALOG_FILE_NAME, b"{\"truncated\": ")
            .await
            .unwrap();

        let report = d.reconciler.pull_catalog().await;

        assert_eq!(report.catalog, CatalogOutcome::Failed);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(local_catalog(&d).await, Some(local));
    }

    #[tokio::test]
    async fn test_pull_rejects_cloud_catalog_with_duplicate_urls() {
        let cloud = MemoryCloudStore::new();
        let d = device(cloud.device_handle()).await;
        let local = catalog_bytes(&["https://a/m.json"]);
        write_local_catalog(&d, &local).await;
        cloud
            .write_file(
                CATALOG_FILE_NAME,
                &catalog_bytes(&["https://b/m.json", "https://b/m.json"]),
            )
            .await
            .unwrap();
        let mut events = d.reconciler.subscribe();

        let report = d.reconciler.pull_catalog().await;

        assert_eq!(report.catalog, CatalogOutcome::Failed);
        assert!(report.errors[0].contains("duplicate metadata URL"));
        assert_eq!(local_catalog(&d).await, Some(local));
        assert!(events.try_recv().is_err());
    }

    // ── Catalog push ────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_push_catalog() {
        let cloud = MemoryCloudStore::new();
        let d = device(cloud.device_handle()).await;

        assert_eq!(
            d.reconciler.push_catalog().await.catalog,
            CatalogOutcome::NothingToPush
        );

        let local = catalog_bytes(&["https://a/m.json"]);
        write_local_catalog(&d, &local).await;
        assert_eq!(d.reconciler.push_catalog().await.catalog, CatalogOutcome::Pushed);
        assert_eq!(
            cloud.read_file(CATALOG_FILE_NAME).await.unwrap(),
            Some(local)
        );
        assert_eq!(
            d.reconciler.push_catalog().await.catalog,
            CatalogOutcome::Unchanged
        );
    }

    // ── Convergence ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_catalog_converges_across_devices() {
        let cloud = MemoryCloudStore::new();
        let phone = device(cloud.device_handle()).await;
        let tablet = device(cloud.device_handle()).await;

        let l = catalog_bytes(&["https://l/m.json"]);
        let c = catalog_bytes(&["https://c/m.json"]);
        write_local_catalog(&phone, &l).await;
        cloud.write_file(CATALOG_FILE_NAME, &c).await.unwrap();

        // Pull: phone converges to the cloud copy.
        phone.reconciler.pull_catalog().await;
        assert_eq!(local_catalog(&phone).await, Some(c.clone()));

        // Another device with catalog L pushes on background.
        write_local_catalog(&tablet, &l).await;
        tablet.reconciler.handle(SyncTrigger::Background).await;
        assert_eq!(cloud.read_file(CATALOG_FILE_NAME).await.unwrap(), Some(l.clone()));

        // Next pull brings the phone to L.
        phone.reconciler.handle(SyncTrigger::CloudChanged).await;
        assert_eq!(local_catalog(&phone).await, Some(l));
    }

    #[tokio::test]
    async fn test_converged_cycles_do_not_oscillate() {
        let cloud = MemoryCloudStore::new();
        let phone = device(cloud.device_handle()).await;
        let tablet = device(cloud.device_handle()).await;
        write_local_catalog(&phone, &catalog_bytes(&["https://a/m.json"])).await;
        phone
            .prefs
            .set("externalPlayer", json!("VLC"), ChangeOrigin::Local)
            .await
            .unwrap();

        // First cycle converges both devices.
        phone.reconciler.push_all().await;
        tablet.reconciler.pull_all().await;
        phone.reconciler.pull_all().await;
        tablet.reconciler.push_all().await;

        let writes = cloud.write_count();
        let mut phone_events = phone.reconciler.subscribe();
        let mut tablet_events = tablet.reconciler.subscribe();

        for _ in 0..3 {
            let reports = [
                phone.reconciler.pull_all().await,
                phone.reconciler.push_all().await,
                tablet.reconciler.pull_all().await,
                tablet.reconciler.push_all().await,
            ];
            for report in reports {
                assert!(report.is_clean());
                assert_eq!(report.preferences_changed, 0);
                assert_eq!(report.catalog, CatalogOutcome::Unchanged);
            }
        }

        assert_eq!(cloud.write_count(), writes);
        assert!(phone_events.try_recv().is_err());
        assert!(tablet_events.try_recv().is_err());
        assert_eq!(local_catalog(&phone).await, local_catalog(&tablet).await);
    }

    // ── Preferences ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_pull_preferences_overwrites_local() {
        let cloud = MemoryCloudStore::new();
        let d = device(cloud.device_handle()).await;
        d.prefs
            .set("mediaColumnsPortrait", json!(2), ChangeOrigin::Local)
            .await
            .unwrap();
        cloud.set_value("mediaColumnsPortrait", json!(4)).await.unwrap();
        cloud.set_value("lastPlayedTime_ep1", json!(93.5)).await.unwrap();
        cloud.set_value("someFutureSetting", json!(true)).await.unwrap();
        cloud.set_value("AppleLanguages", json!("fr")).await.unwrap();
        cloud.set_value("bookmarks", json!(["x"])).await.unwrap();
        cloud.set_value("progress_ep2", json!("half")).await.unwrap();
        let mut events = d.reconciler.subscribe();
        let mut pref_changes = d.prefs.subscribe();

        let report = d.reconciler.pull_preferences().await;

        assert_eq!(report.preferences_changed, 3);
        let local = d.prefs.snapshot().await.unwrap();
        assert_eq!(local["mediaColumnsPortrait"], json!(4));
        assert_eq!(local["lastPlayedTime_ep1"], json!(93.5));
        assert_eq!(local["someFutureSetting"], json!(true));
        assert!(!local.contains_key("AppleLanguages"));
        assert!(!local.contains_key("bookmarks"));
        assert!(!local.contains_key("progress_ep2"));
        assert_eq!(
            events.try_recv().unwrap(),
            SyncEvent::PreferencesSynced { changed: 3 }
        );
        assert_eq!(pref_changes.try_recv().unwrap().origin, ChangeOrigin::Sync);
    }

    #[tokio::test]
    async fn test_push_preferences_writes_only_differences() {
        let cloud = MemoryCloudStore::new();
        let d = device(cloud.device_handle()).await;
        for (key, value) in [
            ("externalPlayer", json!("Infuse")),
            ("progress_ep2", json!(0.5)),
            ("internal.installId", json!("abc")),
            ("selectedModuleId", json!("m-1")),
        ] {
            d.prefs.set(key, value, ChangeOrigin::Local).await.unwrap();
        }
        cloud.set_value("selectedModuleId", json!("m-1")).await.unwrap();
        let writes = cloud.write_count();

        let report = d.reconciler.push_preferences().await;

        assert_eq!(report.preferences_changed, 2);
        assert_eq!(cloud.write_count(), writes + 2);
        assert_eq!(
            cloud.get_value("externalPlayer").await.unwrap(),
            Some(json!("Infuse"))
        );
        assert_eq!(cloud.get_value("progress_ep2").await.unwrap(), Some(json!(0.5)));
        assert!(cloud.get_value("internal.installId").await.unwrap().is_none());
    }

    // ── Partial failure ─────────────────────────────────────────────────

    #[tokio::test]
    async fn test_unavailable_cloud_is_reported_not_fatal() {
        let cloud = MemoryCloudStore::new();
        let d = device(cloud.device_handle()).await;
        let local = catalog_bytes(&["https://a/m.json"]);
        write_local_catalog(&d, &local).await;
        cloud.set_available(false);

        let pull = d.reconciler.handle(SyncTrigger::Foreground).await;
        assert_eq!(pull.direction, SyncDirection::Pull);
        assert_eq!(pull.catalog, CatalogOutcome::Failed);
        assert_eq!(pull.errors.len(), 2);
        assert_eq!(local_catalog(&d).await, Some(local.clone()));

        let push = d.reconciler.handle(SyncTrigger::Background).await;
        assert_eq!(push.catalog, CatalogOutcome::Failed);
        assert!(!push.is_clean());

        // Picked up again at the next natural trigger.
        cloud.set_available(true);
        let push = d.reconciler.handle(SyncTrigger::Background).await;
        assert!(push.is_clean());
        assert_eq!(cloud.read_file(CATALOG_FILE_NAME).await.unwrap(), Some(local));
    }

    #[tokio::test]
    async fn test_preferences_changed_trigger_only_pushes_preferences() {
        let cloud = MemoryCloudStore::new();
        let d = device(cloud.device_handle()).await;
        write_local_catalog(&d, &catalog_bytes(&["https://a/m.json"])).await;
        d.prefs
            .set("alwaysLandscape", json!(true), ChangeOrigin::Local)
            .await
            .unwrap();

        let report = d.reconciler.handle(SyncTrigger::PreferencesChanged).await;

        assert_eq!(report.direction, SyncDirection::Push);
        assert_eq!(report.catalog, CatalogOutcome::NotRun);
        assert_eq!(report.preferences_changed, 1);
        assert!(!cloud.file_exists(CATALOG_FILE_NAME).await.unwrap());
    }
}
