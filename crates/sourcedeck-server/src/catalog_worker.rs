//! Catalog worker: reacts to catalogs pulled from the cloud store.
//!
//! Scripts are not part of the cloud copy, so a catalog pulled from
//! another device may name modules whose script file is missing here.
//! After every pull the worker reloads the catalog, re-downloads the
//! missing scripts and deletes scripts of modules the pull dropped.

use std::sync::Arc;

use sourcedeck_modules::ModuleManager;
use sourcedeck_sync::SyncEvent;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

pub fn spawn(
    modules: Arc<ModuleManager>,
    mut events: broadcast::Receiver<SyncEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                event = events.recv() => event,
            };

            match event {
                Ok(SyncEvent::CatalogSynced) => on_catalog_synced(&modules).await,
                Ok(SyncEvent::PreferencesSynced { changed }) => {
                    tracing::debug!(changed, "preferences updated from cloud");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "catalog worker lagged, checking catalog");
                    on_catalog_synced(&modules).await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::debug!("catalog worker stopped");
    })
}

async fn on_catalog_synced(modules: &ModuleManager) {
    match modules.load().await {
        Ok(records) => tracing::info!(modules = records.len(), "catalog reloaded after sync"),
        Err(e) => {
            tracing::error!("failed to reload catalog after sync: {e}");
            return;
        }
    }

    let report = modules.restore_missing_scripts().await;
    if report.missing > 0 {
        tracing::info!(
            missing = report.missing,
            restored = report.restored,
            failed = report.failures.len(),
            "restored module scripts"
        );
    }

    if let Err(e) = modules.prune_orphan_scripts().await {
        tracing::warn!("failed to prune module scripts after sync: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sourcedeck_modules::catalog::encode_catalog;
    use sourcedeck_modules::{
        CatalogStore, HttpFetcher, ModuleDescriptor, ModuleRecord, ModulesConfig,
        CATALOG_FILE_NAME,
    };
    use sourcedeck_sync::mock::MemoryCloudStore;
    use sourcedeck_sync::{CloudReconciler, CloudStore, JsonPreferenceStore};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_pulled_catalog_gets_its_scripts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/module.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("// remote"))
            .mount(&server)
            .await;

        let descriptor: ModuleDescriptor = serde_json::from_value(json!({
            "sourceName": "Remote",
            "author": { "name": "a", "icon": "" },
            "iconUrl": "",
            "version": "1.0",
            "language": "en",
            "baseUrl": server.uri(),
            "streamType": "HLS",
            "quality": "720p",
            "searchBaseUrl": server.uri(),
            "scriptUrl": format!("{}/module.js", server.uri())
        }))
        .unwrap();
        let record = ModuleRecord::new(descriptor, format!("{}/module.json", server.uri()));

        let cloud = MemoryCloudStore::new();
        cloud
            .write_file(CATALOG_FILE_NAME, &encode_catalog(&[record.clone()]).unwrap())
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let config = ModulesConfig::default();
        let catalog = Arc::new(CatalogStore::new(dir.path()));
        let modules = Arc::new(ModuleManager::new(
            catalog.clone(),
            Arc::new(HttpFetcher::new(&config).unwrap()),
            &config,
        ));
        let prefs = Arc::new(JsonPreferenceStore::open_in(dir.path()).await.unwrap());
        let reconciler =
            CloudReconciler::new(catalog.clone(), prefs, Arc::new(cloud.device_handle()));

        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = spawn(modules.clone(), reconciler.subscribe(), stop_rx);

        reconciler.pull_catalog().await;

        let mut restored = false;
        for _ in 0..100 {
            if catalog.script_exists(&record.local_path).await {
                restored = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(restored);
        assert_eq!(
            modules.get_module_content(&record).await.unwrap(),
            "// remote"
        );

        stop_tx.send(true).unwrap();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_pulled_catalog_drops_removed_scripts() {
        let descriptor: ModuleDescriptor = serde_json::from_value(json!({
            "sourceName": "Gone",
            "author": { "name": "a", "icon": "" },
            "iconUrl": "",
            "version": "1.0",
            "language": "en",
            "baseUrl": "https://example.com",
            "streamType": "HLS",
            "quality": "720p",
            "searchBaseUrl": "https://example.com",
            "scriptUrl": "https://example.com/module.js"
        }))
        .unwrap();
        let record = ModuleRecord::new(descriptor, "https://example.com/module.json");

        let dir = tempfile::tempdir().unwrap();
        let config = ModulesConfig::default();
        let catalog = Arc::new(CatalogStore::new(dir.path()));
        {
            let txn = catalog.lock().await;
            txn.write_script(&record.local_path, "// local").await.unwrap();
            txn.commit(&[record.clone()]).await.unwrap();
        }
        let modules = Arc::new(ModuleManager::new(
            catalog.clone(),
            Arc::new(HttpFetcher::new(&config).unwrap()),
            &config,
        ));

        // Another device deleted the module.
        let cloud = MemoryCloudStore::new();
        cloud
            .write_file(CATALOG_FILE_NAME, &encode_catalog(&[]).unwrap())
            .await
            .unwrap();
        let prefs = Arc::new(JsonPreferenceStore::open_in(dir.path()).await.unwrap());
        let reconciler =
            CloudReconciler::new(catalog.clone(), prefs, Arc::new(cloud.device_handle()));

        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = spawn(modules.clone(), reconciler.subscribe(), stop_rx);

        reconciler.pull_catalog().await;
        assert!(catalog.records().await.unwrap().is_empty());

        let mut pruned = false;
        for _ in 0..100 {
            if !catalog.script_exists(&record.local_path).await {
                pruned = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(pruned);

        stop_tx.send(true).unwrap();
        worker.await.unwrap();
    }
}
