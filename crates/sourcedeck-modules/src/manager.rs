//! Module lifecycle manager: add, refresh, delete and read modules.
//!
//! Owns every catalog mutation that needs a network round trip. Fetches
//! happen outside the catalog lock; the resulting writes are applied
//! while holding it, so concurrent operations serialise at the write.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use url::Url;
use uuid::Uuid;

use crate::catalog::{CatalogStore, ModuleRecord};
use crate::config::ModulesConfig;
use crate::descriptor::{parse_module_url, ModuleDescriptor};
use crate::error::ModuleError;
use crate::events::{ModuleEvent, EVENT_CHANNEL_CAPACITY};
use crate::fetcher::ModuleFetcher;

// ─── Reports ────────────────────────────────────────────────────────────

/// A module that could not be processed by a best-effort batch.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleFailure {
    pub id: Uuid,
    pub metadata_url: String,
    pub error: String,
}

/// Outcome of [`ModuleManager::refresh_all`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    pub checked: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failures: Vec<ModuleFailure>,
}

/// Outcome of [`ModuleManager::restore_missing_scripts`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct RestoreReport {
    pub missing: usize,
    pub restored: usize,
    pub failures: Vec<ModuleFailure>,
}

/// What a refresh task found for one module.
enum RefreshOutcome {
    Unchanged,
    Changed {
        descriptor: ModuleDescriptor,
        script: String,
    },
}

// ─── Fetch helpers ──────────────────────────────────────────────────────

async fn fetch_descriptor(
    fetcher: &dyn ModuleFetcher,
    url: &Url,
) -> Result<ModuleDescriptor, ModuleError> {
    let bytes = fetcher.fetch(url).await?;
    ModuleDescriptor::parse_and_validate(&bytes)
}

async fn fetch_script(
    fetcher: &dyn ModuleFetcher,
    descriptor: &ModuleDescriptor,
) -> Result<String, ModuleError> {
    let script_url = descriptor.script_url()?;
    let bytes = fetcher.fetch(&script_url).await?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| ModuleError::Encoding(format!("script at {script_url}: {e}")))
}

/// Fetch a module's descriptor and, when its version differs from the
/// stored one, its new script.
async fn check_for_update(
    fetcher: &dyn ModuleFetcher,
    record: &ModuleRecord,
) -> Result<RefreshOutcome, ModuleError> {
    let url = parse_module_url(&record.metadata_url)?;
    let descriptor = fetch_descriptor(fetcher, &url).await?;

    // Any difference counts, including a downgrade.
    if descriptor.version == record.metadata.version {
        return Ok(RefreshOutcome::Unchanged);
    }

    let script = fetch_script(fetcher, &descriptor).await?;
    Ok(RefreshOutcome::Changed { descriptor, script })
}

// ─── Manager ────────────────────────────────────────────────────────────

/// Service object owning the local module catalog.
pub struct ModuleManager {
    catalog: Arc<CatalogStore>,
    fetcher: Arc<dyn ModuleFetcher>,
    events: broadcast::Sender<ModuleEvent>,
    refresh_semaphore: Arc<Semaphore>,
}

impl ModuleManager {
    pub fn new(
        catalog: Arc<CatalogStore>,
        fetcher: Arc<dyn ModuleFetcher>,
        config: &ModulesConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            catalog,
            fetcher,
            events,
            refresh_semaphore: Arc::new(Semaphore::new(config.max_concurrent_refreshes.max(1))),
        }
    }

    pub fn catalog(&self) -> &Arc<CatalogStore> {
        &self.catalog
    }

    /// Subscribe to module events emitted by this manager.
    pub fn subscribe(&self) -> broadcast::Receiver<ModuleEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ModuleEvent) {
        tracing::debug!(event = event.name(), "emitting module event");
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    /// Read the catalog at startup, surfacing a corrupt file to the caller.
    pub async fn load(&self) -> Result<Vec<ModuleRecord>, ModuleError> {
        let records = self.catalog.records().await?;
        for record in &records {
            if !self.catalog.script_exists(&record.local_path).await {
                tracing::warn!(
                    module_id = %record.id,
                    local_path = %record.local_path,
                    "module script missing on disk"
                );
            }
        }
        tracing::info!(count = records.len(), "module catalog loaded");
        Ok(records)
    }

    pub async fn list_modules(&self) -> Result<Vec<ModuleRecord>, ModuleError> {
        self.catalog.records().await
    }

    pub async fn get_module(&self, id: Uuid) -> Result<ModuleRecord, ModuleError> {
        self.catalog
            .records()
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or(ModuleError::NotFound(id))
    }

    /// Add a module from its metadata URL.
    ///
    /// Nothing is written unless every fetch and validation step succeeds.
    pub async fn add_module(&self, metadata_url: &str) -> Result<ModuleRecord, ModuleError> {
        let url = parse_module_url(metadata_url)?;
        let key = url.to_string();

        // Cheap check first so duplicates never hit the network.
        if self
            .catalog
            .records()
            .await?
            .iter()
            .any(|r| r.metadata_url == key)
        {
            return Err(ModuleError::DuplicateModule(key));
        }

        tracing::info!(metadata_url = %key, "adding module");

        let descriptor = fetch_descriptor(self.fetcher.as_ref(), &url).await?;
        let script = fetch_script(self.fetcher.as_ref(), &descriptor).await?;

        let txn = self.catalog.lock().await;
        let mut records = txn.load().await?;

        // Another add of the same URL may have committed while we fetched.
        if records.iter().any(|r| r.metadata_url == key) {
            return Err(ModuleError::DuplicateModule(key));
        }

        let record = ModuleRecord::new(descriptor, key);
        txn.write_script(&record.local_path, &script).await?;
        records.push(record.clone());

        if let Err(e) = txn.commit(&records).await {
            if let Err(cleanup) = txn.remove_script(&record.local_path).await {
                tracing::error!(
                    local_path = %record.local_path,
                    "failed to remove script after catalog write failure: {cleanup}"
                );
            }
            return Err(e);
        }
        drop(txn);

        tracing::info!(
            module_id = %record.id,
            source_name = %record.metadata.source_name,
            version = %record.metadata.version,
            "module added"
        );
        self.emit(ModuleEvent::Added {
            id: record.id,
            source_name: record.metadata.source_name.clone(),
        });

        Ok(record)
    }

    /// Delete a module: script file first, then the record.
    pub async fn delete_module(&self, id: Uuid) -> Result<(), ModuleError> {
        let txn = self.catalog.lock().await;
        let mut records = txn.load().await?;
        let pos = records
            .iter()
            .position(|r| r.id == id)
            .ok_or(ModuleError::NotFound(id))?;

        txn.remove_script(&records[pos].local_path).await?;
        let removed = records.remove(pos);
        txn.commit(&records).await?;
        drop(txn);

        tracing::info!(
            module_id = %id,
            source_name = %removed.metadata.source_name,
            "module removed"
        );
        self.emit(ModuleEvent::Removed { id });
        Ok(())
    }

    /// Script text of a module. Local read only, never touches the network.
    pub async fn get_module_content(&self, record: &ModuleRecord) -> Result<String, ModuleError> {
        self.catalog.read_script(&record.local_path).await
    }

    /// Mark a module active or inactive. Other modules are left untouched.
    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<ModuleRecord, ModuleError> {
        let txn = self.catalog.lock().await;
        let mut records = txn.load().await?;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(ModuleError::NotFound(id))?;

        if record.is_active == active {
            return Ok(record.clone());
        }
        record.is_active = active;
        let updated = record.clone();
        txn.commit(&records).await?;
        drop(txn);

        self.emit(ModuleEvent::ActiveChanged {
            id,
            is_active: active,
        });
        Ok(updated)
    }

    /// Re-fetch every module's descriptor and apply version changes.
    ///
    /// Best-effort: a failing module is logged, recorded in the report and
    /// skipped. Fetches run concurrently; each update is committed as soon
    /// as its own fetches finish.
    pub async fn refresh_all(&self) -> RefreshReport {
        let mut report = RefreshReport::default();

        let records = match self.catalog.records().await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("refresh: failed to read catalog: {e}");
                return report;
            }
        };
        report.checked = records.len();

        let mut tasks = JoinSet::new();
        for record in records {
            let fetcher = Arc::clone(&self.fetcher);
            let semaphore = Arc::clone(&self.refresh_semaphore);
            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => check_for_update(fetcher.as_ref(), &record).await,
                    Err(_) => Err(ModuleError::Network("refresh limiter closed".into())),
                };
                (record, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (record, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::error!("refresh task panicked: {e}");
                    continue;
                }
            };

            let result = match outcome {
                Ok(RefreshOutcome::Unchanged) => {
                    tracing::debug!(module_id = %record.id, "module up to date");
                    report.unchanged += 1;
                    continue;
                }
                Ok(RefreshOutcome::Changed { descriptor, script }) => {
                    self.apply_update(record.id, descriptor, &script).await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(Some(_)) => report.updated += 1,
                Ok(None) => report.unchanged += 1,
                Err(e) => {
                    tracing::warn!(
                        module_id = %record.id,
                        metadata_url = %record.metadata_url,
                        "module refresh failed: {e}"
                    );
                    report.failures.push(ModuleFailure {
                        id: record.id,
                        metadata_url: record.metadata_url.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            checked = report.checked,
            updated = report.updated,
            unchanged = report.unchanged,
            failed = report.failures.len(),
            "module refresh complete"
        );
        report
    }

    /// Commit a refreshed descriptor and script for one module.
    ///
    /// Returns the replaced version, or `None` when the module was deleted
    /// or already carries that version.
    async fn apply_update(
        &self,
        id: Uuid,
        descriptor: ModuleDescriptor,
        script: &str,
    ) -> Result<Option<String>, ModuleError> {
        let txn = self.catalog.lock().await;
        let mut records = txn.load().await?;
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            tracing::debug!(module_id = %id, "module deleted during refresh, skipping");
            return Ok(None);
        };
        if record.metadata.version == descriptor.version {
            return Ok(None);
        }

        // The new script only becomes visible once the catalog names its
        // version, so a failed commit leaves the old pair intact.
        let staged = txn.stage_script(&record.local_path, script).await?;
        let new_version = descriptor.version.clone();
        let old = std::mem::replace(&mut record.metadata, descriptor);
        if let Err(e) = txn.commit(&records).await {
            txn.discard_script(staged).await;
            return Err(e);
        }
        txn.publish_script(staged).await?;
        drop(txn);

        tracing::info!(
            module_id = %id,
            old_version = %old.version,
            new_version = %new_version,
            "module updated"
        );
        self.emit(ModuleEvent::Updated {
            id,
            old_version: old.version.clone(),
            new_version,
        });
        Ok(Some(old.version))
    }

    /// Fetch scripts for records whose file is missing locally.
    ///
    /// Records arriving through a catalog sync reference scripts that only
    /// exist on the device that added them.
    pub async fn restore_missing_scripts(&self) -> RestoreReport {
        let mut report = RestoreReport::default();

        let records = match self.catalog.records().await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("restore: failed to read catalog: {e}");
                return report;
            }
        };

        for record in records {
            if self.catalog.script_exists(&record.local_path).await {
                continue;
            }
            report.missing += 1;

            let result = match fetch_script(self.fetcher.as_ref(), &record.metadata).await {
                Ok(script) => self.write_restored_script(&record, &script).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(true) => report.restored += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        module_id = %record.id,
                        script_url = %record.metadata.script_url,
                        "failed to restore module script: {e}"
                    );
                    report.failures.push(ModuleFailure {
                        id: record.id,
                        metadata_url: record.metadata_url.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if report.restored > 0 {
            tracing::info!(restored = report.restored, "module scripts restored");
            self.emit(ModuleEvent::ScriptsRestored {
                count: report.restored,
            });
        }
        report
    }

    async fn write_restored_script(
        &self,
        record: &ModuleRecord,
        script: &str,
    ) -> Result<bool, ModuleError> {
        let txn = self.catalog.lock().await;
        let still_listed = txn.load().await?.iter().any(|r| r.id == record.id);
        if !still_listed || self.catalog.script_exists(&record.local_path).await {
            return Ok(false);
        }
        txn.write_script(&record.local_path, script).await?;
        Ok(true)
    }

    /// Delete script files no catalog record refers to.
    ///
    /// A pulled catalog can drop modules deleted on another device; their
    /// scripts stay behind here until this runs. Leftover temp files from
    /// an interrupted write are removed too.
    pub async fn prune_orphan_scripts(&self) -> Result<usize, ModuleError> {
        let txn = self.catalog.lock().await;
        let records = txn.load().await?;
        let referenced: HashSet<PathBuf> = records
            .iter()
            .map(|r| self.catalog.script_path(&r.local_path))
            .collect();

        let mut removed = 0;
        for name in txn.script_file_names().await? {
            if referenced.contains(&self.catalog.script_path(&name)) {
                continue;
            }
            txn.remove_script(&name).await?;
            tracing::debug!(file = %name, "removed orphan module script");
            removed += 1;
        }
        drop(txn);

        if removed > 0 {
            tracing::info!(removed, "orphan module scripts pruned");
        }
        Ok(removed)
    }
}
