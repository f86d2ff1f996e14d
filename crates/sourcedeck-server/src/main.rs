use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use serde_json::Value;
use sourcedeck_modules::{CatalogStore, HttpFetcher, ModuleManager};
use sourcedeck_sync::{
    spawn_sync_worker, CloudReconciler, DirectoryCloudStore, JsonPreferenceStore,
    PreferenceStore, SyncTrigger,
};
use tokio::sync::{mpsc, watch};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod api;
mod catalog_worker;
mod config;
mod state;

use config::ServerConfig;
use state::{AppState, SyncHandle};

/// Buffered lifecycle triggers waiting for the sync worker.
const SYNC_TRIGGER_BUFFER: usize = 16;

/// Preference key that turns on a module refresh at launch.
const REFRESH_ON_LAUNCH_KEY: &str = "refreshModulesOnLaunch";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env();
    tracing::info!(data_dir = %config.data_dir.display(), "starting SourceDeck");

    // Local stores
    let catalog = Arc::new(CatalogStore::new(&config.data_dir));
    let fetcher = Arc::new(HttpFetcher::new(&config.modules).expect("failed to build HTTP client"));
    let modules = Arc::new(ModuleManager::new(catalog.clone(), fetcher, &config.modules));
    let preferences: Arc<dyn PreferenceStore> = Arc::new(
        JsonPreferenceStore::open_in(&config.data_dir)
            .await
            .expect("failed to open preference store"),
    );

    if let Err(e) = modules.load().await {
        tracing::error!("failed to load module catalog: {e}");
    }

    // Cloud sync
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = Vec::new();

    let sync = if config.sync.enabled {
        tracing::info!(cloud_dir = %config.sync.cloud_dir.display(), "cloud sync enabled");
        let cloud = Arc::new(DirectoryCloudStore::new(&config.sync.cloud_dir));
        let reconciler = Arc::new(CloudReconciler::new(
            catalog.clone(),
            preferences.clone(),
            cloud,
        ));

        // Subscribe before the launch pull so its catalog gets scripts too.
        workers.push(catalog_worker::spawn(
            modules.clone(),
            reconciler.subscribe(),
            shutdown_rx.clone(),
        ));
        reconciler.handle(SyncTrigger::Launch).await;

        let (triggers, triggers_rx) = mpsc::channel(SYNC_TRIGGER_BUFFER);
        workers.push(spawn_sync_worker(
            reconciler.clone(),
            triggers_rx,
            shutdown_rx.clone(),
        ));
        Some(SyncHandle {
            reconciler,
            triggers,
        })
    } else {
        tracing::info!("cloud sync disabled");
        None
    };

    let refresh_pref = matches!(
        preferences.get(REFRESH_ON_LAUNCH_KEY).await,
        Ok(Some(Value::Bool(true)))
    );
    if config.refresh_on_launch || refresh_pref {
        let report = modules.refresh_all().await;
        tracing::info!(
            checked = report.checked,
            updated = report.updated,
            failed = report.failures.len(),
            "launch refresh finished"
        );
    }

    let state = Arc::new(AppState {
        modules,
        preferences,
        sync,
    });

    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .expect("failed to bind listen address");
    tracing::info!(addr = %config.bind, "server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!("worker task failed: {e}");
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|s| HeaderValue::from_str(s).ok())
        .collect();
    if origins.is_empty() {
        tracing::warn!("CORS_ORIGINS not set, cross-origin requests are refused");
    } else {
        tracing::info!("CORS allowed origins: {:?}", origins);
    }
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
